//! Error taxonomy for the texture/compute bridge and the histogram calculator.

use thiserror::Error;

pub type Result<T, E = HistogramError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HistogramError {
    #[error("invalid histogram spec: {0}")]
    InvalidSpec(String),

    #[error("no compatible GPU device at index {index} ({available} adapter(s) visible)")]
    DeviceUnavailable { index: usize, available: usize },

    #[error("compute context error: {0}")]
    ContextError(String),

    #[error("failed to load kernel module '{path}': {reason}")]
    ModuleLoadError { path: String, reason: String },

    #[error("symbol '{symbol}' not found in kernel module: {reason}")]
    SymbolNotFound { symbol: String, reason: String },

    #[error("texture registration failed for handle {handle}: {reason}")]
    RegistrationError { handle: u64, reason: String },

    #[error("mapping out of sequence: {0}")]
    MappingError(String),

    #[error("kernel launch failed: {0}")]
    LaunchError(String),
}

impl HistogramError {
    /// Failures that cannot fix themselves between two paints.
    ///
    /// A kernel file that does not parse or lacks a symbol will fail the
    /// same way on every retry; a texture that is not allocated yet or a
    /// context bound to the wrong thread may succeed later.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistogramError::InvalidSpec(_)
                | HistogramError::ModuleLoadError { .. }
                | HistogramError::SymbolNotFound { .. }
        )
    }

    pub(crate) fn module_load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        HistogramError::ModuleLoadError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn symbol(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        HistogramError::SymbolNotFound {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn registration(handle: u64, reason: impl Into<String>) -> Self {
        HistogramError::RegistrationError {
            handle,
            reason: reason.into(),
        }
    }
}
