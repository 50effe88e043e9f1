//! Static correction and alignment modules

pub mod timewindow;
pub mod peak_correction;
pub mod correlation_stack;
pub mod stack;

// Re-export main types
pub use timewindow::TimewindowCatalog;
pub use peak_correction::{
    estimate, CorrectionCollector, CorrectionReport, ObservedWaveform, PeakCorrectionParams,
    PeakCorrectionRunner, PeakMeasurement, SyntheticLibrary,
};
pub use correlation_stack::{find_best_shift, AlignerParams, CorrelationAligner, ShiftEstimate};
pub use stack::{StackMethod, Stacker};
