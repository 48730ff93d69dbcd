//! Envelope encrypt/decrypt of message payloads.
//!
//! `encrypt` draws a fresh DEK and IV for every call, seals the plaintext
//! with AES-256-GCM and wraps the DEK through the configured key provider.
//! Two encryptions of the same plaintext never share a ciphertext or IV.

use std::sync::Arc;

use crate::aead::{self, AES_256_GCM, IV_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::provider::KeyProvider;

/// The encrypted components stored alongside a message.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
    /// The per-message DEK, wrapped by the master key.
    pub wrapped_dek: Vec<u8>,
    /// The GCM nonce used for this payload.
    pub iv: [u8; IV_LEN],
    /// Always [`AES_256_GCM`].
    pub algorithm: String,
    /// Identifier of the master key that wrapped the DEK.
    pub key_id: String,
}

/// Envelope encryption service.
pub struct EncryptionService {
    provider: Arc<dyn KeyProvider>,
}

impl EncryptionService {
    /// Create a service over an already-verified provider.
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self { provider }
    }

    /// Create a service and prove the provider works by round-tripping a
    /// throwaway DEK. A bridge configured for encryption refuses to start
    /// when its key provider is unreachable.
    pub async fn initialise(provider: Arc<dyn KeyProvider>) -> CryptoResult<Self> {
        let probe = aead::generate_dek();
        let wrapped = provider.wrap_dek(&probe).await?;
        let unwrapped = provider.unwrap_dek(&wrapped, provider.key_id()).await?;
        if unwrapped.as_ref() != probe.as_ref() {
            return Err(CryptoError::KeyService(
                "key provider probe round-trip mismatch".into(),
            ));
        }
        tracing::info!(key_id = %provider.key_id(), "Encryption service initialised");
        Ok(Self::new(provider))
    }

    /// Encrypt a payload under a fresh DEK.
    pub async fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedPayload> {
        let dek = aead::generate_dek();
        let iv = aead::generate_iv();

        let ciphertext = aead::seal(&dek, &iv, plaintext.as_bytes())?;
        let wrapped_dek = self.provider.wrap_dek(&dek).await?;

        Ok(EncryptedPayload {
            ciphertext,
            wrapped_dek,
            iv,
            algorithm: AES_256_GCM.to_string(),
            key_id: self.provider.key_id().to_string(),
        })
    }

    /// Unwrap the DEK recorded in `payload` and decrypt.
    pub async fn decrypt(&self, payload: &EncryptedPayload) -> CryptoResult<String> {
        if payload.algorithm != AES_256_GCM {
            return Err(CryptoError::InvalidPayload(format!(
                "unsupported algorithm {}",
                payload.algorithm
            )));
        }

        let dek = self
            .provider
            .unwrap_dek(&payload.wrapped_dek, &payload.key_id)
            .await?;
        let plaintext = aead::open(&dek, &payload.iv, &payload.ciphertext)?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::InvalidPayload("decrypted payload is not UTF-8".into()))
    }

    /// Identifier of the master key in use.
    pub fn key_id(&self) -> &str {
        self.provider.key_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvault::StubKeyVault;
    use crate::provider::{LocalKeyProvider, RemoteKeyProvider};

    fn local_service() -> EncryptionService {
        EncryptionService::new(Arc::new(LocalKeyProvider::new([42u8; 32])))
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        let service = local_service();
        let plaintext = "{1:F01BANKBEBBAXXX}{4::20:FT123-}";

        let payload = service.encrypt(plaintext).await.unwrap();
        assert_eq!(payload.algorithm, AES_256_GCM);
        assert_eq!(payload.key_id, "local-key");

        let recovered = service.decrypt(&payload).await.unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn test_same_plaintext_distinct_ciphertexts() {
        let service = local_service();

        let first = service.encrypt("identical payload").await.unwrap();
        let second = service.encrypt("identical payload").await.unwrap();

        assert_ne!(first.ciphertext, second.ciphertext);
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.wrapped_dek, second.wrapped_dek);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_authentication() {
        let service = local_service();
        let mut payload = service.encrypt("audit trail entry").await.unwrap();
        payload.ciphertext[0] ^= 0xFF;

        assert!(matches!(
            service.decrypt(&payload).await,
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_tampered_wrapped_dek_fails() {
        let service = local_service();
        let mut payload = service.encrypt("payload").await.unwrap();
        let last = payload.wrapped_dek.len() - 1;
        payload.wrapped_dek[last] ^= 0x01;

        assert!(service.decrypt(&payload).await.is_err());
    }

    #[tokio::test]
    async fn test_initialise_fails_fast_on_dead_vault() {
        let vault = Arc::new(StubKeyVault::new());
        let provider = Arc::new(RemoteKeyProvider::connect(vault.clone()).await.unwrap());

        vault.set_failing(true);
        assert!(EncryptionService::initialise(provider).await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_rejected() {
        let service = local_service();
        let mut payload = service.encrypt("payload").await.unwrap();
        payload.algorithm = "AES-128-CBC".to_string();

        assert!(matches!(
            service.decrypt(&payload).await,
            Err(CryptoError::InvalidPayload(_))
        ));
    }
}
