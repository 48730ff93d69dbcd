//! Bridge error taxonomy.
//!
//! Store-path errors never change a producer response that has already
//! been shaped; they surface in logs and counters only. Publish failures
//! surface as a response status, not as a pipeline abort.

use thiserror::Error;

use meridian_crypto::CryptoError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Request shape is wrong; surfaced to the caller as 400.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The broker refused or timed out a publish.
    #[error("Broker publish failed: {0}")]
    Publish(String),

    /// The broker subscription could not be established.
    #[error("Broker subscribe failed: {0}")]
    Subscribe(String),

    /// An object-store operation failed.
    #[error("Object store error: {0}")]
    Store(String),

    /// The requested blob does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Envelope encryption failed; includes tamper detection on decrypt.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A record could not be serialised or parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Startup configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True when this error is the AEAD tamper signal.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::AuthenticationFailed))
    }
}
