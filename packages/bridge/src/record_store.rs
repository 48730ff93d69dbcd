//! Record store: typed records over the blob gateway.
//!
//! Encrypts payloads through the envelope service before delegating to the
//! object store, and decrypts on retrieval. Retrieval returns a decrypted
//! view: `content` populated, crypto fields cleared, `encrypted=false`.
//! The blob on disk is untouched by reads.

use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use meridian_crypto::{EncryptedPayload, EncryptionService};

use crate::error::{BridgeError, BridgeResult};
use crate::gateway::ObjectStoreGateway;
use crate::records::{
    message_blob_name, transformation_blob_name, MessageStatus, StoredMessageRecord,
    TransformationRecord,
};

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn from_b64(field: &str, value: &str) -> BridgeResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| BridgeError::Store(format!("{field} is not base64: {e}")))
}

/// Typed record store over the blob gateway.
pub struct RecordStore {
    store: Arc<dyn ObjectStoreGateway>,
    crypto: Option<Arc<EncryptionService>>,
    container: String,
}

impl RecordStore {
    /// `crypto: None` stores plaintext records (`encrypted=false`).
    pub fn new(
        store: Arc<dyn ObjectStoreGateway>,
        crypto: Option<Arc<EncryptionService>>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            store,
            crypto,
            container: container.into(),
        }
    }

    /// Create the backing container when absent. Called once at startup.
    pub async fn init(&self) -> BridgeResult<()> {
        self.store.ensure_container(&self.container).await
    }

    /// Whether records are encrypted at rest.
    pub fn encryption_enabled(&self) -> bool {
        self.crypto.is_some()
    }

    /// Container the records live in.
    pub fn container(&self) -> &str {
        &self.container
    }

    // ========== Message records ==========

    /// Persist a message record, encrypting the payload when encryption
    /// is configured.
    pub async fn save_message(
        &self,
        message_id: Uuid,
        destination: &str,
        correlation_id: Option<&str>,
        status: MessageStatus,
        content: &str,
    ) -> BridgeResult<StoredMessageRecord> {
        let mut record = StoredMessageRecord {
            message_id,
            destination: destination.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            timestamp: Utc::now(),
            original_status: status,
            encrypted: false,
            content: Some(content.to_string()),
            encrypted_content: None,
            encrypted_data_key: None,
            encryption_iv: None,
            encryption_algorithm: None,
            key_vault_key_id: None,
        };

        if let Some(crypto) = &self.crypto {
            let sealed = crypto.encrypt(content).await?;
            record.encrypted = true;
            record.content = None;
            record.encrypted_content = Some(b64(&sealed.ciphertext));
            record.encrypted_data_key = Some(b64(&sealed.wrapped_dek));
            record.encryption_iv = Some(b64(&sealed.iv));
            record.encryption_algorithm = Some(sealed.algorithm);
            record.key_vault_key_id = Some(sealed.key_id);
        }

        let bytes = serde_json::to_vec(&record)?;
        self.store
            .put(&self.container, &record.blob_name(), bytes)
            .await?;
        tracing::debug!(message_id = %message_id, encrypted = record.encrypted, "Message record stored");
        Ok(record)
    }

    /// Load and decrypt one message record.
    pub async fn fetch_message(&self, message_id: Uuid) -> BridgeResult<StoredMessageRecord> {
        let bytes = self
            .store
            .get(&self.container, &message_blob_name(message_id))
            .await?;
        let record: StoredMessageRecord = serde_json::from_slice(&bytes)?;
        self.decrypt_message(record).await
    }

    /// Load and decrypt up to `limit` message records. Records that fail
    /// decryption are skipped with a logged error so one bad blob cannot
    /// hide the rest of the listing.
    pub async fn list_messages(&self, limit: usize) -> BridgeResult<Vec<StoredMessageRecord>> {
        let names = self
            .store
            .list(&self.container, Some("message-"), limit)
            .await?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let bytes = match self.store.get(&self.container, &name).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(blob = %name, error = %e, "Blob disappeared during listing");
                    continue;
                }
            };
            let parsed: StoredMessageRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(blob = %name, error = %e, "Unreadable message record skipped");
                    continue;
                }
            };
            match self.decrypt_message(parsed).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::error!(blob = %name, error = %e, "Undecryptable message record skipped")
                }
            }
        }
        Ok(records)
    }

    /// Delete one message record.
    pub async fn delete_message(&self, message_id: Uuid) -> BridgeResult<()> {
        self.store
            .delete(&self.container, &message_blob_name(message_id))
            .await
    }

    async fn decrypt_message(
        &self,
        mut record: StoredMessageRecord,
    ) -> BridgeResult<StoredMessageRecord> {
        if !record.encrypted {
            return Ok(record);
        }
        let crypto = self.crypto.as_ref().ok_or_else(|| {
            BridgeError::Store("encrypted record but encryption is not configured".into())
        })?;

        let payload = encrypted_payload(
            record.encrypted_content.as_deref(),
            record.encrypted_data_key.as_deref(),
            record.encryption_iv.as_deref(),
            record.encryption_algorithm.as_deref(),
            record.key_vault_key_id.as_deref(),
        )?;
        let plaintext = crypto.decrypt(&payload).await?;

        record.encrypted = false;
        record.content = Some(plaintext);
        record.encrypted_content = None;
        record.encrypted_data_key = None;
        record.encryption_iv = None;
        record.encryption_algorithm = None;
        record.key_vault_key_id = None;
        Ok(record)
    }

    // ========== Transformation records ==========

    /// Persist a transformation record. Input and output are encrypted
    /// under independent DEKs so one compromised payload key leaks only
    /// one message.
    pub async fn save_transformation(
        &self,
        mut record: TransformationRecord,
    ) -> BridgeResult<TransformationRecord> {
        if let Some(crypto) = &self.crypto {
            if let Some(input) = record.input_content.take() {
                let sealed = crypto.encrypt(&input).await?;
                record.input_encrypted_content = Some(b64(&sealed.ciphertext));
                record.input_encrypted_data_key = Some(b64(&sealed.wrapped_dek));
                record.input_encryption_iv = Some(b64(&sealed.iv));
                record.encryption_algorithm = Some(sealed.algorithm);
                record.key_vault_key_id = Some(sealed.key_id);
                record.encrypted = true;
            }
            if let Some(output) = record.output_content.take() {
                let sealed = crypto.encrypt(&output).await?;
                record.output_encrypted_content = Some(b64(&sealed.ciphertext));
                record.output_encrypted_data_key = Some(b64(&sealed.wrapped_dek));
                record.output_encryption_iv = Some(b64(&sealed.iv));
                record.encryption_algorithm = Some(sealed.algorithm);
                record.key_vault_key_id = Some(sealed.key_id);
                record.encrypted = true;
            }
        }

        let bytes = serde_json::to_vec(&record)?;
        self.store
            .put(&self.container, &record.blob_name(), bytes)
            .await?;
        tracing::debug!(
            transformation_id = %record.transformation_id,
            status = ?record.status,
            "Transformation record stored"
        );
        Ok(record)
    }

    /// Load and decrypt one transformation record.
    pub async fn fetch_transformation(
        &self,
        transformation_id: Uuid,
    ) -> BridgeResult<TransformationRecord> {
        let bytes = self
            .store
            .get(&self.container, &transformation_blob_name(transformation_id))
            .await?;
        let record: TransformationRecord = serde_json::from_slice(&bytes)?;
        self.decrypt_transformation(record).await
    }

    /// Load and decrypt up to `limit` transformation records.
    pub async fn list_transformations(
        &self,
        limit: usize,
    ) -> BridgeResult<Vec<TransformationRecord>> {
        let names = self
            .store
            .list(&self.container, Some("transformation-"), limit)
            .await?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let Ok(bytes) = self.store.get(&self.container, &name).await else {
                continue;
            };
            let parsed: TransformationRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(blob = %name, error = %e, "Unreadable transformation record skipped");
                    continue;
                }
            };
            match self.decrypt_transformation(parsed).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::error!(blob = %name, error = %e, "Undecryptable transformation record skipped")
                }
            }
        }
        Ok(records)
    }

    async fn decrypt_transformation(
        &self,
        mut record: TransformationRecord,
    ) -> BridgeResult<TransformationRecord> {
        if !record.encrypted {
            return Ok(record);
        }
        let crypto = self.crypto.as_ref().ok_or_else(|| {
            BridgeError::Store("encrypted record but encryption is not configured".into())
        })?;

        if record.input_encrypted_content.is_some() {
            let payload = encrypted_payload(
                record.input_encrypted_content.as_deref(),
                record.input_encrypted_data_key.as_deref(),
                record.input_encryption_iv.as_deref(),
                record.encryption_algorithm.as_deref(),
                record.key_vault_key_id.as_deref(),
            )?;
            record.input_content = Some(crypto.decrypt(&payload).await?);
        }
        if record.output_encrypted_content.is_some() {
            let payload = encrypted_payload(
                record.output_encrypted_content.as_deref(),
                record.output_encrypted_data_key.as_deref(),
                record.output_encryption_iv.as_deref(),
                record.encryption_algorithm.as_deref(),
                record.key_vault_key_id.as_deref(),
            )?;
            record.output_content = Some(crypto.decrypt(&payload).await?);
        }

        record.encrypted = false;
        record.input_encrypted_content = None;
        record.input_encrypted_data_key = None;
        record.input_encryption_iv = None;
        record.output_encrypted_content = None;
        record.output_encrypted_data_key = None;
        record.output_encryption_iv = None;
        record.encryption_algorithm = None;
        record.key_vault_key_id = None;
        Ok(record)
    }
}

/// Rebuild an [`EncryptedPayload`] from record fields.
fn encrypted_payload(
    ciphertext: Option<&str>,
    wrapped_dek: Option<&str>,
    iv: Option<&str>,
    algorithm: Option<&str>,
    key_id: Option<&str>,
) -> BridgeResult<EncryptedPayload> {
    let (Some(ciphertext), Some(wrapped_dek), Some(iv), Some(algorithm), Some(key_id)) =
        (ciphertext, wrapped_dek, iv, algorithm, key_id)
    else {
        return Err(BridgeError::Store(
            "encrypted record is missing a crypto field".into(),
        ));
    };

    let iv_bytes = from_b64("encryptionIv", iv)?;
    let iv: [u8; 12] = iv_bytes
        .try_into()
        .map_err(|_| BridgeError::Store("encryptionIv must be 12 bytes".into()))?;

    Ok(EncryptedPayload {
        ciphertext: from_b64("encryptedContent", ciphertext)?,
        wrapped_dek: from_b64("encryptedDataKey", wrapped_dek)?,
        iv,
        algorithm: algorithm.to_string(),
        key_id: key_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryObjectStore;
    use meridian_crypto::LocalKeyProvider;
    use meridian_parsers::{TransformationStatus, TransformationType};

    fn encrypted_store() -> (Arc<InMemoryObjectStore>, RecordStore) {
        let gateway = Arc::new(InMemoryObjectStore::new());
        let crypto = Arc::new(EncryptionService::new(Arc::new(LocalKeyProvider::new(
            [9u8; 32],
        ))));
        let records = RecordStore::new(gateway.clone(), Some(crypto), "solace-messages");
        (gateway, records)
    }

    #[tokio::test]
    async fn test_message_roundtrip_encrypted() {
        let (gateway, records) = encrypted_store();
        records.init().await.unwrap();

        let id = Uuid::new_v4();
        let saved = records
            .save_message(id, "orders", Some("corr-9"), MessageStatus::Sent, "payload")
            .await
            .unwrap();
        assert!(saved.encrypted);
        assert!(saved.is_well_formed());
        assert_eq!(gateway.blob_count("solace-messages"), 1);

        let fetched = records.fetch_message(id).await.unwrap();
        assert_eq!(fetched.content.as_deref(), Some("payload"));
        assert_eq!(fetched.original_status, MessageStatus::Sent);
        assert_eq!(fetched.correlation_id.as_deref(), Some("corr-9"));
        assert!(fetched.encrypted_content.is_none());
    }

    #[tokio::test]
    async fn test_blob_holds_no_plaintext() {
        let (gateway, records) = encrypted_store();
        let id = Uuid::new_v4();
        records
            .save_message(id, "orders", None, MessageStatus::Sent, "SECRET-MARKER")
            .await
            .unwrap();

        let raw = gateway
            .get("solace-messages", &message_blob_name(id))
            .await
            .unwrap();
        let raw_text = String::from_utf8(raw).unwrap();
        assert!(!raw_text.contains("SECRET-MARKER"));
        assert!(raw_text.contains("\"encrypted\":true"));
        assert!(raw_text.contains("\"content\":null"));
    }

    #[tokio::test]
    async fn test_tampered_blob_fails_authentication() {
        let (gateway, records) = encrypted_store();
        let id = Uuid::new_v4();
        records
            .save_message(id, "orders", None, MessageStatus::Sent, "payload")
            .await
            .unwrap();

        // Flip one byte inside the base64 of encryptedContent
        let blob = message_blob_name(id);
        assert!(gateway.corrupt_blob("solace-messages", &blob, |bytes| {
            let text = String::from_utf8(bytes.clone()).unwrap();
            let marker = "\"encryptedContent\":\"";
            let start = text.find(marker).unwrap() + marker.len();
            bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
        }));

        let result = records.fetch_message(id).await;
        match result {
            Err(e) => assert!(e.is_authentication_failure() || matches!(e, BridgeError::Store(_))),
            Ok(_) => panic!("tampered record must not decrypt"),
        }
    }

    #[tokio::test]
    async fn test_plaintext_mode() {
        let gateway = Arc::new(InMemoryObjectStore::new());
        let records = RecordStore::new(gateway, None, "solace-messages");
        assert!(!records.encryption_enabled());

        let id = Uuid::new_v4();
        let saved = records
            .save_message(id, "orders", None, MessageStatus::Excluded, "visible")
            .await
            .unwrap();
        assert!(!saved.encrypted);
        assert_eq!(saved.content.as_deref(), Some("visible"));
        assert!(saved.is_well_formed());

        let fetched = records.fetch_message(id).await.unwrap();
        assert_eq!(fetched.content.as_deref(), Some("visible"));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_, records) = encrypted_store();
        let mut ids = Vec::new();
        for i in 0..4 {
            let id = Uuid::new_v4();
            records
                .save_message(id, "orders", None, MessageStatus::Sent, &format!("m{i}"))
                .await
                .unwrap();
            ids.push(id);
        }

        assert_eq!(records.list_messages(10).await.unwrap().len(), 4);
        assert_eq!(records.list_messages(2).await.unwrap().len(), 2);

        records.delete_message(ids[0]).await.unwrap();
        assert_eq!(records.list_messages(10).await.unwrap().len(), 3);
        assert!(matches!(
            records.fetch_message(ids[0]).await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transformation_independent_deks() {
        let (gateway, records) = encrypted_store();
        let record = TransformationRecord {
            transformation_id: Uuid::new_v4(),
            input_message_id: "in-1".into(),
            output_message_id: Some("out-1".into()),
            input_message_type: Some("MT103".into()),
            output_message_type: Some("MT202".into()),
            transformation_type: TransformationType::Mt103ToMt202,
            status: TransformationStatus::Success,
            input_queue: "in".into(),
            output_queue: "out".into(),
            correlation_id: Some("corr".into()),
            timestamp: Utc::now(),
            processing_time_ms: 12,
            attempt_count: 1,
            error_message: None,
            warnings: Vec::new(),
            confidence_score: Some(1.0),
            encrypted: false,
            input_content: Some("input payload".into()),
            output_content: Some("output payload".into()),
            input_encrypted_content: None,
            input_encrypted_data_key: None,
            input_encryption_iv: None,
            output_encrypted_content: None,
            output_encrypted_data_key: None,
            output_encryption_iv: None,
            encryption_algorithm: None,
            key_vault_key_id: None,
        };
        let id = record.transformation_id;

        let saved = records.save_transformation(record).await.unwrap();
        assert!(saved.encrypted);
        // Independent DEKs for the two sides
        assert_ne!(saved.input_encrypted_data_key, saved.output_encrypted_data_key);
        assert_ne!(saved.input_encryption_iv, saved.output_encryption_iv);
        assert!(saved.input_content.is_none());
        assert_eq!(gateway.blob_count("solace-messages"), 1);

        let fetched = records.fetch_transformation(id).await.unwrap();
        assert_eq!(fetched.input_content.as_deref(), Some("input payload"));
        assert_eq!(fetched.output_content.as_deref(), Some("output payload"));
        assert_eq!(fetched.status, TransformationStatus::Success);

        assert_eq!(records.list_transformations(10).await.unwrap().len(), 1);
    }
}
