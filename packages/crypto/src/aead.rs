//! AES-256-GCM primitives.
//!
//! The only cipher the bridge records: 256-bit keys, 96-bit IVs, 128-bit
//! authentication tag appended to the ciphertext. DEKs and IVs are drawn
//! from the OS CSPRNG on every encryption; key buffers are zeroed on drop.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Algorithm identifier recorded in every encrypted record.
pub const AES_256_GCM: &str = "AES-256-GCM";

/// DEK length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// IV length in bytes (GCM standard nonce).
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Generate a fresh 256-bit data encryption key.
pub fn generate_dek() -> Zeroizing<[u8; KEY_LEN]> {
    let mut dek = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(&mut *dek);
    dek
}

/// Generate a fresh 96-bit IV.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key`/`iv`. The returned ciphertext carries
/// the 16-byte authentication tag as its suffix.
pub fn seal(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("AEAD seal failed".into()))
}

/// Decrypt and authenticate. Fails with [`CryptoError::AuthenticationFailed`]
/// when the tag does not verify; no partial plaintext escapes.
pub fn open(key: &[u8; KEY_LEN], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidPayload(format!(
            "IV must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::InvalidPayload(
            "ciphertext shorter than authentication tag".into(),
        ));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
