pub mod calculator;
pub mod painter;
pub mod reference;
pub mod region;
pub mod result;

pub use calculator::{CalculatorStatus, HistogramCalculator};
pub use painter::HistogramPainter;
pub use reference::cpu_histogram;
pub use region::{RegionOfInterest, TexelWindow};
pub use result::HistogramResult;
