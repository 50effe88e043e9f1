//! seistatics: static corrections for observed/synthetic seismogram pairs
//!
//! This library estimates per-path time shifts and amplitude ratios from
//! windowed peak pairs, aligns traces to a reference waveform by
//! cross-correlation, and stores correction sets in a compact binary file.

pub mod types;
pub mod trace;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AlignError, AlignmentKey, AmbiguousWindow, CodecError, Component, EstimationError, EventId,
    HorizontalPosition, StaticCorrection, StaticsError, StaticsResult, Station, Timewindow,
    TimewindowInformation, TraceError,
};

pub use trace::Trace;
pub use io::{decode, encode, StaticCorrectionFile};
pub use crate::core::{
    estimate, AlignerParams, CorrelationAligner, PeakCorrectionParams, PeakCorrectionRunner,
    StackMethod, Stacker, TimewindowCatalog,
};
