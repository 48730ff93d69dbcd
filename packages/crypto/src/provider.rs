//! Key providers: who wraps the per-message DEKs.
//!
//! Two implementations sit behind one trait: a local master key loaded from
//! configuration (development only) and the remote key vault, where the
//! master key never leaves the service.

use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::aead::{self, KEY_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::keyvault::KeyVaultGateway;

/// Key identifier reported by the local provider.
pub const LOCAL_KEY_ID: &str = "local-key";

/// Capability set for DEK wrapping.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Wrap a DEK under the master key.
    async fn wrap_dek(&self, dek: &[u8; KEY_LEN]) -> CryptoResult<Vec<u8>>;

    /// Unwrap a DEK. `key_id` is the identifier recorded alongside the
    /// ciphertext at encryption time.
    async fn unwrap_dek(&self, wrapped: &[u8], key_id: &str) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>>;

    /// Identifier recorded in encrypted records produced with this provider.
    fn key_id(&self) -> &str;
}

/// Development-only provider: the master key is a 256-bit value from
/// configuration and wrapping is the same AEAD as the data path.
pub struct LocalKeyProvider {
    master_key: Zeroizing<[u8; KEY_LEN]>,
}

impl LocalKeyProvider {
    /// Create a provider from raw master-key bytes.
    pub fn new(master_key: [u8; KEY_LEN]) -> Self {
        Self {
            master_key: Zeroizing::new(master_key),
        }
    }

    /// Create a provider from a base64-encoded 256-bit master key, as it
    /// appears in configuration.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("master key not base64: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!("master key must be {KEY_LEN} bytes"))
        })?;
        Ok(Self::new(key))
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    async fn wrap_dek(&self, dek: &[u8; KEY_LEN]) -> CryptoResult<Vec<u8>> {
        let iv = aead::generate_iv();
        let mut wrapped = iv.to_vec();
        wrapped.extend(aead::seal(&self.master_key, &iv, dek.as_slice())?);
        Ok(wrapped)
    }

    async fn unwrap_dek(
        &self,
        wrapped: &[u8],
        _key_id: &str,
    ) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
        if wrapped.len() <= aead::IV_LEN {
            return Err(CryptoError::InvalidKeyMaterial(
                "wrapped DEK too short".into(),
            ));
        }
        let (iv, ciphertext) = wrapped.split_at(aead::IV_LEN);
        let dek = aead::open(&self.master_key, iv, ciphertext)?;
        let key: [u8; KEY_LEN] = dek
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial("unwrapped DEK has wrong length".into()))?;
        Ok(Zeroizing::new(key))
    }

    fn key_id(&self) -> &str {
        LOCAL_KEY_ID
    }
}

/// Production provider: wrap/unwrap are calls to the remote key service.
/// Each call times out and fails on its own; DEKs are never cached.
pub struct RemoteKeyProvider {
    gateway: Arc<dyn KeyVaultGateway>,
    key_id: String,
}

impl RemoteKeyProvider {
    /// Connect to the vault and resolve the current key identifier.
    ///
    /// Fails when the vault is unreachable so that a misconfigured bridge
    /// refuses to start instead of silently downgrading.
    pub async fn connect(gateway: Arc<dyn KeyVaultGateway>) -> CryptoResult<Self> {
        let key_id = gateway.current_key_id().await?;
        tracing::info!(key_id = %key_id, "Connected to remote key service");
        Ok(Self { gateway, key_id })
    }
}

#[async_trait]
impl KeyProvider for RemoteKeyProvider {
    async fn wrap_dek(&self, dek: &[u8; KEY_LEN]) -> CryptoResult<Vec<u8>> {
        self.gateway.wrap(&self.key_id, dek.as_slice()).await
    }

    async fn unwrap_dek(
        &self,
        wrapped: &[u8],
        key_id: &str,
    ) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
        let dek = self.gateway.unwrap(key_id, wrapped).await?;
        let key: [u8; KEY_LEN] = dek
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial("unwrapped DEK has wrong length".into()))?;
        Ok(Zeroizing::new(key))
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
