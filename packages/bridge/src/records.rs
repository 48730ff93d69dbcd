//! Stored message and transformation records.
//!
//! Records are write-once at the pipeline that creates them; a republish
//! materialises a new record under a new message id. The persisted JSON
//! shape is part of the external contract: encrypted records carry
//! `encryptedContent`/`encryptedDataKey`/`encryptionIv` (base64) plus the
//! algorithm and key identifiers, and `content` is null; unencrypted
//! records carry `content` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_parsers::{TransformationStatus, TransformationType};

/// Terminal status of the message that produced a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Failed,
    Excluded,
    Republished,
}

/// Inbound producer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub content: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl SendRequest {
    /// Reject empty content or destination before the pipeline runs.
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        if self.destination.trim().is_empty() {
            return Err("destination must not be empty".into());
        }
        Ok(())
    }
}

/// Response shaped by the send pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message_id: Uuid,
    pub status: MessageStatus,
    pub destination: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted message record. Exactly one of the plaintext and the
/// encrypted field group carries the payload, switched by `encrypted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessageRecord {
    pub message_id: Uuid,
    pub destination: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub original_status: MessageStatus,
    pub encrypted: bool,
    /// Plaintext payload; null whenever `encrypted` is true.
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_key_id: Option<String>,
}

impl StoredMessageRecord {
    /// Blob name under the message naming scheme.
    pub fn blob_name(&self) -> String {
        message_blob_name(self.message_id)
    }

    /// Does the record satisfy the encrypted/plaintext exclusivity rule?
    pub fn is_well_formed(&self) -> bool {
        if self.encrypted {
            self.content.is_none()
                && self.encrypted_content.is_some()
                && self.encrypted_data_key.is_some()
                && self.encryption_iv.is_some()
                && self.encryption_algorithm.is_some()
                && self.key_vault_key_id.is_some()
        } else {
            self.content.is_some() && self.encrypted_content.is_none()
        }
    }
}

/// Blob name for a message id.
pub fn message_blob_name(message_id: Uuid) -> String {
    format!("message-{message_id}.json")
}

/// Blob name for a transformation id.
pub fn transformation_blob_name(transformation_id: Uuid) -> String {
    format!("transformation-{transformation_id}.json")
}

/// A persisted transformation record. Input and output payloads are
/// encrypted under independent DEKs; both DEKs wrap under the master key
/// named by `keyVaultKeyId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRecord {
    pub transformation_id: Uuid,
    pub input_message_id: String,
    #[serde(default)]
    pub output_message_id: Option<String>,
    #[serde(default)]
    pub input_message_type: Option<String>,
    #[serde(default)]
    pub output_message_type: Option<String>,
    pub transformation_type: TransformationType,
    pub status: TransformationStatus,
    pub input_queue: String,
    pub output_queue: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub encrypted: bool,
    /// Plaintext payloads; null whenever `encrypted` is true.
    pub input_content: Option<String>,
    #[serde(default)]
    pub output_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_encrypted_data_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_encryption_iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_encrypted_data_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_encryption_iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_key_id: Option<String>,
}

impl TransformationRecord {
    /// Blob name under the transformation naming scheme.
    pub fn blob_name(&self) -> String {
        transformation_blob_name(self.transformation_id)
    }
}
