//! Error types for vector field computation.

use thiserror::Error;

/// Result type for vector field operations.
pub type Result<T> = std::result::Result<T, FieldError>;

/// Errors that can occur while creating, evolving or sampling a field.
///
/// None of these are fatal: a failed call leaves the engine usable and the
/// caller decides whether to skip the tick, retry, or switch device.
#[derive(Error, Debug)]
pub enum FieldError {
    /// Malformed request, non-finite weight/coordinate or invalid setting.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Field shape or cell count does not match what the operation expects.
    #[error("Dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        /// Expected (width, height).
        expected: (u32, u32),
        /// Actual (width, height).
        actual: (u32, u32),
    },

    /// Requested compute device could not be acquired.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Host or device allocation failed, or a buffer exceeds device limits.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Device-side execution failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Buffer mapping or readback failure.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Device name that is neither `cpu` nor `gpu`/`parallel`.
    #[error("Unknown compute device: {0}")]
    UnknownDevice(String),

    /// Configuration loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl FieldError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a device unavailable error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    /// Create a resource exhaustion error.
    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create a backend execution error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a transfer error.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Whether this error signals a missing or unusable device.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FieldError::mismatch((4, 3), (3, 4));
        assert_eq!(err.to_string(), "Dimension mismatch: expected 4x3, got 3x4");

        let err = FieldError::device("no adapter");
        assert_eq!(err.to_string(), "Device unavailable: no adapter");
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn test_invalid_input_not_device_error() {
        let err = FieldError::invalid_input("weight is NaN");
        assert!(!err.is_device_unavailable());
    }
}
