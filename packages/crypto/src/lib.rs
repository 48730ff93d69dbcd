//! Meridian-Crypto: Envelope Encryption Service
//!
//! Every stored payload is encrypted under a fresh per-message DEK
//! (data encryption key); the DEK itself is wrapped by a master key that
//! never appears next to the ciphertext. Tampering with any encrypted
//! component fails authentication on decrypt.
//!
//! Modules:
//! - `aead`: AES-256-GCM primitives (96-bit IV, 128-bit tag)
//! - `provider`: key providers (local master key, remote key vault)
//! - `keyvault`: HTTP client for the remote wrap/unwrap service
//! - `envelope`: the envelope encrypt/decrypt service

pub mod aead;
pub mod envelope;
pub mod error;
pub mod keyvault;
pub mod provider;

// Re-exports
pub use aead::AES_256_GCM;
pub use envelope::{EncryptedPayload, EncryptionService};
pub use error::{CryptoError, CryptoResult};
pub use keyvault::{KeyVaultClient, KeyVaultGateway, StubKeyVault};
pub use provider::{KeyProvider, LocalKeyProvider, RemoteKeyProvider};
