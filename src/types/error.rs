//! Error types for holder operations
//!
//! Store failures are carried through unchanged; nothing here retries.

/// Main error type for holder operations
#[derive(Debug, thiserror::Error)]
pub enum HolderError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(#[from] mongodb::error::Error),

    #[error("Store error: {0}")]
    Backend(String),

    #[error("Encode error: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("Cursor visitor failed: {0}")]
    Visitor(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HolderError {
    /// Shorthand for an [`HolderError::InvalidArgument`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether the failure came from the store (driver or backend)
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Backend(_))
    }
}

impl From<bson::oid::Error> for HolderError {
    fn from(err: bson::oid::Error) -> Self {
        Self::InvalidArgument(format!("malformed identity: {}", err))
    }
}

/// Result type alias for holder operations
pub type Result<T> = std::result::Result<T, HolderError>;
