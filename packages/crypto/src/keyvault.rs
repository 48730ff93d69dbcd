//! Remote key-service gateway.
//!
//! Thin HTTP client for the external wrap/unwrap service. The master key
//! never leaves the vault: the bridge only ever sees wrapped DEKs. Wrapping
//! uses RSA-OAEP-SHA256 on a 4096-bit vault key; the vault reports the key
//! identifier that gets recorded next to each ciphertext.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aead;
use crate::error::{CryptoError, CryptoResult};

const WRAP_ALGORITHM: &str = "RSA-OAEP-256";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque gateway to the key service.
///
/// Each call times out and fails independently; no DEK is cached here.
#[async_trait]
pub trait KeyVaultGateway: Send + Sync {
    /// Wrap a DEK under the vault key identified by `key_id`.
    async fn wrap(&self, key_id: &str, dek: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Unwrap a wrapped DEK under the vault key identified by `key_id`.
    async fn unwrap(&self, key_id: &str, wrapped: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Identifier of the current vault key.
    async fn current_key_id(&self) -> CryptoResult<String>;
}

#[derive(Debug, Serialize)]
struct KeyOperationRequest<'a> {
    alg: &'a str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct KeyOperationResponse {
    #[allow(dead_code)]
    kid: Option<String>,
    value: String,
}

#[derive(Debug, Deserialize)]
struct KeyMetadataResponse {
    kid: String,
}

/// HTTP client for the remote key service.
pub struct KeyVaultClient {
    http: reqwest::Client,
    base_url: String,
    key_name: String,
}

impl KeyVaultClient {
    /// Create a client for `base_url` operating on the named vault key.
    pub fn new(base_url: impl Into<String>, key_name: impl Into<String>) -> CryptoResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CryptoError::KeyService(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_name: key_name.into(),
        })
    }

    async fn key_operation(&self, operation: &str, value: &[u8]) -> CryptoResult<Vec<u8>> {
        let url = format!("{}/keys/{}/{}", self.base_url, self.key_name, operation);
        let body = KeyOperationRequest {
            alg: WRAP_ALGORITHM,
            value: base64::engine::general_purpose::STANDARD.encode(value),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CryptoError::KeyService(format!("{operation} request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CryptoError::KeyService(format!(
                "{operation} returned HTTP {}",
                response.status()
            )));
        }

        let parsed: KeyOperationResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::KeyService(format!("{operation} response malformed: {e}")))?;

        base64::engine::general_purpose::STANDARD
            .decode(parsed.value)
            .map_err(|e| CryptoError::KeyService(format!("{operation} value not base64: {e}")))
    }
}

#[async_trait]
impl KeyVaultGateway for KeyVaultClient {
    async fn wrap(&self, _key_id: &str, dek: &[u8]) -> CryptoResult<Vec<u8>> {
        self.key_operation("wrap", dek).await
    }

    async fn unwrap(&self, _key_id: &str, wrapped: &[u8]) -> CryptoResult<Vec<u8>> {
        self.key_operation("unwrap", wrapped).await
    }

    async fn current_key_id(&self) -> CryptoResult<String> {
        let url = format!("{}/keys/{}", self.base_url, self.key_name);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CryptoError::KeyService(format!("key lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CryptoError::KeyService(format!(
                "key lookup returned HTTP {}",
                response.status()
            )));
        }

        let parsed: KeyMetadataResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::KeyService(format!("key metadata malformed: {e}")))?;
        Ok(parsed.kid)
    }
}

/// In-process stand-in for the vault, for tests and local development.
///
/// Wraps DEKs under a random in-memory master key using the same AEAD as
/// the data path. Not RSA; never use outside a dev environment.
pub struct StubKeyVault {
    master_key: zeroize::Zeroizing<[u8; 32]>,
    key_id: String,
    fail_calls: std::sync::atomic::AtomicBool,
}

impl StubKeyVault {
    /// Create a stub vault with a random master key.
    pub fn new() -> Self {
        Self {
            master_key: aead::generate_dek(),
            key_id: "https://stub.vault.local/keys/bridge-key/1".to_string(),
            fail_calls: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make all subsequent calls fail, to exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        self.fail_calls
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_available(&self) -> CryptoResult<()> {
        if self.fail_calls.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CryptoError::KeyService("stub vault unavailable".into()));
        }
        Ok(())
    }
}

impl Default for StubKeyVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyVaultGateway for StubKeyVault {
    async fn wrap(&self, _key_id: &str, dek: &[u8]) -> CryptoResult<Vec<u8>> {
        self.check_available()?;
        let iv = aead::generate_iv();
        let mut wrapped = iv.to_vec();
        wrapped.extend(aead::seal(&self.master_key, &iv, dek)?);
        Ok(wrapped)
    }

    async fn unwrap(&self, _key_id: &str, wrapped: &[u8]) -> CryptoResult<Vec<u8>> {
        self.check_available()?;
        if wrapped.len() <= aead::IV_LEN {
            return Err(CryptoError::InvalidKeyMaterial(
                "wrapped DEK too short".into(),
            ));
        }
        let (iv, ciphertext) = wrapped.split_at(aead::IV_LEN);
        aead::open(&self.master_key, iv, ciphertext)
    }

    async fn current_key_id(&self) -> CryptoResult<String> {
        self.check_available()?;
        Ok(self.key_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_wrap_unwrap_roundtrip() {
        let vault = StubKeyVault::new();
        let dek = aead::generate_dek();

        let key_id = vault.current_key_id().await.unwrap();
        let wrapped = vault.wrap(&key_id, dek.as_ref()).await.unwrap();
        assert_ne!(wrapped.as_slice(), dek.as_ref());

        let unwrapped = vault.unwrap(&key_id, &wrapped).await.unwrap();
        assert_eq!(unwrapped.as_slice(), dek.as_ref());
    }

    #[tokio::test]
    async fn test_stub_failure_mode() {
        let vault = StubKeyVault::new();
        vault.set_failing(true);
        let dek = aead::generate_dek();
        assert!(matches!(
            vault.wrap("any", dek.as_ref()).await,
            Err(CryptoError::KeyService(_))
        ));
    }

    #[tokio::test]
    async fn test_stub_tampered_wrap_fails() {
        let vault = StubKeyVault::new();
        let dek = aead::generate_dek();
        let mut wrapped = vault.wrap("any", dek.as_ref()).await.unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0xFF;
        assert!(matches!(
            vault.unwrap("any", &wrapped).await,
            Err(CryptoError::AuthenticationFailed)
        ));
    }
}
