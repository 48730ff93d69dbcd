//! Crypto error taxonomy.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption could not be performed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The authentication tag did not verify. No partial plaintext is
    /// ever returned alongside this error.
    #[error("Authentication failed: ciphertext or key material was tampered with")]
    AuthenticationFailed,

    /// A wrap/unwrap call to the key service failed.
    #[error("Key service error: {0}")]
    KeyService(String),

    /// Key material has the wrong shape (length, encoding).
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The encrypted record is missing a component or carries an
    /// unsupported algorithm identifier.
    #[error("Invalid encrypted payload: {0}")]
    InvalidPayload(String),
}
