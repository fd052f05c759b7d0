use std::sync::Arc;

use log::warn;

use super::calculator::HistogramCalculator;
use super::region::RegionOfInterest;
use super::result::HistogramResult;
use crate::config::CalculatorConfig;
use crate::gpu::texture::TextureProvider;

/// Drives a calculator from a paint loop.
///
/// The calculator is created the first time the provider hands out a
/// texture and initialization is retried according to the configured
/// [`RetryPolicy`](crate::config::RetryPolicy).
pub struct HistogramPainter {
    config: CalculatorConfig,
    provider: Arc<dyn TextureProvider>,
    calculator: Option<HistogramCalculator>,
    disposed: bool,
}

impl HistogramPainter {
    pub fn new(config: CalculatorConfig, provider: Arc<dyn TextureProvider>) -> Self {
        HistogramPainter {
            config,
            provider,
            calculator: None,
            disposed: false,
        }
    }

    pub fn calculator(&self) -> Option<&HistogramCalculator> {
        self.calculator.as_ref()
    }

    /// Latest histogram of `region`, or `None` while no texture has ever
    /// been available.
    pub fn paint(&mut self, region: &RegionOfInterest) -> Option<HistogramResult> {
        if self.disposed {
            return None;
        }

        let needs_init = self
            .calculator
            .as_ref()
            .is_none_or(|calc| calc.should_retry());
        if needs_init {
            if let Some(texture) = self.provider.texture().filter(|t| t.handle() != 0) {
                let calc = self.calculator.get_or_insert_with(|| {
                    HistogramCalculator::new(self.config.clone(), self.provider.clone())
                });
                if let Err(err) = calc.initialize(&texture) {
                    warn!("Trouble initializing histogram calculator: {err}");
                }
            }
        }

        self.calculator.as_mut().map(|calc| calc.calculate(region))
    }

    pub fn dispose(&mut self) {
        if let Some(calc) = self.calculator.as_mut() {
            calc.dispose();
        }
        self.disposed = true;
    }
}
