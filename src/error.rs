//! Artgate error types

/// Artgate error types
#[derive(Debug, thiserror::Error)]
pub enum ArtgateError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Generation or poll failure reported by an external image source.
    /// Recoverable: the scheduled sweep re-polls pending operations.
    #[error("provider error: {0}")]
    Provider(String),

    // Operation lifecycle errors
    #[error("operation not found: {0}")]
    NotFound(String),

    #[error("operation not complete: {0}")]
    NotComplete(String),

    /// Local decode/encode/write failure after a provider reported
    /// completion. Terminal: recorded on the operation, never retried.
    #[error("processing error: {0}")]
    Processing(String),

    // Data errors
    #[error("image error: {0}")]
    Image(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("local image pool is empty")]
    PoolEmpty,

    // Configuration errors
    #[error("no image provider configured")]
    NoProvider,

    #[error("no prompts available")]
    NoPrompts,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ArtgateError {
    /// Whether the error is terminal for an operation (recorded as its
    /// final status) rather than recoverable on a later poll.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArtgateError::Processing(_) | ArtgateError::Image(_) | ArtgateError::Io(_)
        )
    }
}

impl From<image::ImageError> for ArtgateError {
    fn from(err: image::ImageError) -> Self {
        ArtgateError::Image(err.to_string())
    }
}

/// Result type alias for Artgate operations
pub type Result<T> = std::result::Result<T, ArtgateError>;
