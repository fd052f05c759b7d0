//! GPU value histograms over a region of a single-channel float texture.

pub mod config;
pub mod error;
pub mod gpu;
pub mod histogram;

pub use config::{CalculatorConfig, HistogramSpec, RetryPolicy};
pub use error::{HistogramError, Result};
pub use histogram::{HistogramCalculator, HistogramPainter, HistogramResult, RegionOfInterest};
