//! Construction-time configuration: the histogram spec and the calculator
//! settings that surround it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::HistogramError;

pub const DEFAULT_KERNEL_PATH: &str = "kernels/histogram_texture.wgsl";

/// Bin layout of a histogram. Fixed for the lifetime of a calculator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHistogramSpec", into = "RawHistogramSpec")]
pub struct HistogramSpec {
    num_bins: u32,
    min_value: f64,
    max_value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawHistogramSpec {
    num_bins: i64,
    min_value: f64,
    max_value: f64,
}

impl HistogramSpec {
    pub fn new(num_bins: i64, min_value: f64, max_value: f64) -> crate::error::Result<Self> {
        if num_bins <= 0 {
            return Err(HistogramError::InvalidSpec(format!(
                "num_bins must be positive, got {num_bins}"
            )));
        }
        let num_bins = u32::try_from(num_bins).map_err(|_| {
            HistogramError::InvalidSpec(format!("num_bins {num_bins} does not fit in u32"))
        })?;
        if !min_value.is_finite() || !max_value.is_finite() {
            return Err(HistogramError::InvalidSpec(format!(
                "value range must be finite, got [{min_value}, {max_value})"
            )));
        }
        if min_value >= max_value {
            return Err(HistogramError::InvalidSpec(format!(
                "min_value must be below max_value, got [{min_value}, {max_value})"
            )));
        }
        let width_f32 = ((max_value - min_value) / num_bins as f64) as f32;
        if !(min_value as f32).is_finite()
            || !(max_value as f32).is_finite()
            || min_value as f32 >= max_value as f32
            || !width_f32.is_normal()
        {
            return Err(HistogramError::InvalidSpec(format!(
                "value range [{min_value}, {max_value}) with {num_bins} bins is not representable in f32"
            )));
        }
        Ok(Self {
            num_bins,
            min_value,
            max_value,
        })
    }

    pub fn num_bins(&self) -> u32 {
        self.num_bins
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn bin_width(&self) -> f64 {
        (self.max_value - self.min_value) / self.num_bins as f64
    }

    /// Bin index for one sample, or `None` for NaN.
    ///
    /// `clamp(floor((value - min_value) / bin_width), 0, num_bins - 1)`,
    /// evaluated in f64 on the exact sample value.
    pub fn bin_index(&self, value: f32) -> Option<u32> {
        if value.is_nan() {
            return None;
        }
        let last = (self.num_bins - 1) as f64;
        Some(self.raw_bin(value as f64).clamp(0.0, last) as u32)
    }

    fn raw_bin(&self, value: f64) -> f64 {
        ((value - self.min_value) / self.bin_width()).floor()
    }

    /// Lower edge of every bin as the smallest f32 that falls in it.
    ///
    /// `edges[0]` is `-inf`. A sample belongs to the last bin whose edge it
    /// reaches, which reproduces [`bin_index`](Self::bin_index) with plain
    /// f32 comparisons on the device.
    pub fn bin_edges_f32(&self) -> Vec<f32> {
        let mut edges = Vec::with_capacity(self.num_bins as usize);
        edges.push(f32::NEG_INFINITY);
        for k in 1..self.num_bins {
            let target = k as f64;
            let mut edge = (self.min_value + target * self.bin_width()) as f32;
            while self.raw_bin(edge as f64) >= target {
                edge = next_f32_down(edge);
            }
            while self.raw_bin(edge as f64) < target {
                edge = next_f32_up(edge);
            }
            edges.push(edge);
        }
        edges
    }
}

fn next_f32_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn next_f32_down(x: f32) -> f32 {
    -next_f32_up(-x)
}

impl TryFrom<RawHistogramSpec> for HistogramSpec {
    type Error = HistogramError;

    fn try_from(raw: RawHistogramSpec) -> std::result::Result<Self, Self::Error> {
        HistogramSpec::new(raw.num_bins, raw.min_value, raw.max_value)
    }
}

impl From<HistogramSpec> for RawHistogramSpec {
    fn from(spec: HistogramSpec) -> Self {
        RawHistogramSpec {
            num_bins: spec.num_bins as i64,
            min_value: spec.min_value,
            max_value: spec.max_value,
        }
    }
}

/// Whether a failed initialization is attempted again on the next paint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry after every failure, including broken kernels.
    Always,
    /// Retry device/registration/context failures; stay failed on load-time
    /// errors such as a missing kernel symbol.
    #[default]
    TransientOnly,
    /// Never retry.
    Never,
}

impl RetryPolicy {
    pub fn allows_retry(self, error: &HistogramError) -> bool {
        match self {
            RetryPolicy::Always => true,
            RetryPolicy::TransientOnly => !error.is_terminal(),
            RetryPolicy::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorConfig {
    pub histogram: HistogramSpec,
    #[serde(default = "default_kernel_path")]
    pub kernel_path: PathBuf,
    #[serde(default)]
    pub device_index: usize,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_kernel_path() -> PathBuf {
    PathBuf::from(DEFAULT_KERNEL_PATH)
}

impl CalculatorConfig {
    pub fn new(histogram: HistogramSpec) -> Self {
        Self {
            histogram,
            kernel_path: default_kernel_path(),
            device_index: 0,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_kernel_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_path = path.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid calculator config json")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in config file {}", path.display()))
    }
}
