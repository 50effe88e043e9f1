//! Correction file I/O

pub mod static_correction_file;

pub use static_correction_file::{decode, default_output_name, encode, StaticCorrectionFile};
