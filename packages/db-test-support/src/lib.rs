//! Test support for the persistence packages
//!
//! Provides the shared logging initialization used by unit and integration
//! tests, plus an in-memory log capture for asserting on emitted output.

pub mod capture;
pub mod logging;

pub use capture::LogCapture;
