//! Common error types for Drive imports.

use thiserror::Error;

/// Top-level error type for token, listing and import operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource not found (unknown user, missing Drive file).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The identity subject has no linked Google identity.
    #[error("Identity not linked: {0}")]
    IdentityNotLinked(String),

    /// The stored grant is gone; the user must authorize Drive access again.
    #[error("Reauthorization required: {0}")]
    ReauthorizationRequired(String),

    /// Caller-supplied fields violate the entity schema.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Content exceeds the file size ceiling.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// The identity-management API rejected the service credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The provider refused access to a resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transport failure or non-success upstream response.
    #[error("Network error: {0}")]
    Network(String),

    /// A persistence collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
