/// Crate-level error type for the unmix factorization library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Input matrix has incorrect shape for the operation.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// The requested cost function is not implemented for the configured
    /// convolutive depth.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience Result type for unmix operations.
pub type Result<T> = std::result::Result<T, Error>;
