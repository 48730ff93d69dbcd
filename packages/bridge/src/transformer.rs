//! Transformation pipeline: consume, transform, publish, store.
//!
//! One state machine per inbound message. Parse and validation failures
//! are terminal (stored, acknowledged, never retried). Transform and
//! publish failures are retried with backoff until attempts run out, then
//! the payload goes to the dead-letter destination and a `DEAD_LETTER`
//! record is stored. Exactly one record is stored per message outcome.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use async_trait::async_trait;

use meridian_parsers::{
    transform, SwiftMessage, TransformationResult, TransformationStatus, TransformationType,
};

use crate::error::BridgeResult;
use crate::gateway::{BrokerGateway, InboundMessage, MessageHandler, MessagePayload};
use crate::metrics::BridgeMetrics;
use crate::record_store::RecordStore;
use crate::records::TransformationRecord;
use crate::retry::RetryService;

/// Queue wiring and type selection for the transformer.
#[derive(Debug, Clone)]
pub struct TransformerSettings {
    pub input_queue: String,
    pub output_queue: String,
    pub transformation_type: TransformationType,
    pub dead_letter_destination: String,
}

/// The broker-consuming transformation pipeline.
pub struct TransformationPipeline {
    broker: Arc<dyn BrokerGateway>,
    records: Arc<RecordStore>,
    retry: Arc<RetryService>,
    metrics: Arc<BridgeMetrics>,
    settings: TransformerSettings,
}

struct SubscriptionHandler {
    pipeline: Arc<TransformationPipeline>,
}

#[async_trait]
impl MessageHandler for SubscriptionHandler {
    async fn on_message(&self, message: InboundMessage) {
        self.pipeline.clone().process(message, 1).await;
    }
}

impl TransformationPipeline {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        records: Arc<RecordStore>,
        retry: Arc<RetryService>,
        metrics: Arc<BridgeMetrics>,
        settings: TransformerSettings,
    ) -> Self {
        Self {
            broker,
            records,
            retry,
            metrics,
            settings,
        }
    }

    /// Attach the consumer to the input queue.
    pub async fn start(self: &Arc<Self>) -> BridgeResult<()> {
        let handler = Arc::new(SubscriptionHandler {
            pipeline: self.clone(),
        });
        self.broker
            .subscribe(&self.settings.input_queue, handler)
            .await?;
        tracing::info!(
            input_queue = %self.settings.input_queue,
            output_queue = %self.settings.output_queue,
            transformation = ?self.settings.transformation_type,
            "Transformation pipeline consuming"
        );
        Ok(())
    }

    /// Process one delivery. `attempt` is 1-based; retries re-enter here.
    /// Returning acknowledges the broker message in every case; retried
    /// work is owned by the retry scheduler from that point on.
    pub async fn process(self: Arc<Self>, message: InboundMessage, attempt: u32) {
        let MessagePayload::Text(content) = &message.payload else {
            // Non-text payloads are acknowledged to break poison loops
            tracing::warn!(message_id = %message.message_id, "Non-text delivery skipped");
            return;
        };
        let content = content.clone();

        let started = std::time::Instant::now();
        let transformation_id = Uuid::new_v4();
        let result = transform(&content, self.settings.transformation_type);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result.status {
            TransformationStatus::Success => {
                self.publish_and_store(
                    &message,
                    &content,
                    result,
                    transformation_id,
                    attempt,
                    elapsed_ms,
                )
                .await;
            }
            TransformationStatus::ParseError | TransformationStatus::ValidationError => {
                // Terminal: no retry, no publish
                self.metrics.record_transformation_failure();
                tracing::warn!(
                    message_id = %message.message_id,
                    status = ?result.status,
                    error = result.error_message.as_deref().unwrap_or("unknown"),
                    "Message rejected by transformer"
                );
                self.store_record(
                    self.record_for(&message, &content, &result, transformation_id, attempt, elapsed_ms),
                )
                .await;
            }
            _ => {
                let reason = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "transformation failed".to_string());
                self.handle_failure(message, content, reason, transformation_id, attempt, elapsed_ms)
                    .await;
            }
        }
    }

    async fn publish_and_store(
        self: &Arc<Self>,
        message: &InboundMessage,
        content: &str,
        result: TransformationResult,
        transformation_id: Uuid,
        attempt: u32,
        elapsed_ms: u64,
    ) {
        let output_message = result
            .output_message
            .clone()
            .unwrap_or_default();
        let output_message_id = Uuid::new_v4().to_string();
        let correlation_id = propagated_correlation(message);

        let mut properties = HashMap::new();
        properties.insert(
            "transformationType".to_string(),
            type_name(self.settings.transformation_type),
        );
        properties.insert("transformationId".to_string(), transformation_id.to_string());
        properties.insert("inputMessageId".to_string(), message.message_id.clone());
        if let Some(input_type) = detect_input_type(content) {
            properties.insert("inputMessageType".to_string(), input_type);
        }
        if let Some(output_type) = &result.output_message_type {
            properties.insert("outputMessageType".to_string(), output_type.clone());
        }
        properties.insert("timestamp".to_string(), Utc::now().to_rfc3339());
        properties.insert("correlationId".to_string(), correlation_id.clone());

        match self
            .broker
            .publish(&self.settings.output_queue, &output_message, &properties)
            .await
        {
            Ok(()) => {
                self.metrics.record_transformation_success();
                let stored_status = if result.warnings.is_empty() {
                    TransformationStatus::Success
                } else {
                    TransformationStatus::PartialSuccess
                };
                let mut record =
                    self.record_for(message, content, &result, transformation_id, attempt, elapsed_ms);
                record.status = stored_status;
                record.output_message_id = Some(output_message_id);
                record.output_content = Some(output_message);
                record.correlation_id = Some(correlation_id);
                self.store_record(record).await;
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    attempt,
                    error = %e,
                    "Output publish failed"
                );
                self.handle_failure(
                    message.clone(),
                    content.to_string(),
                    format!("output publish failed: {e}"),
                    transformation_id,
                    attempt,
                    elapsed_ms,
                )
                .await;
            }
        }
    }

    /// Retry when attempts remain; dead-letter otherwise.
    async fn handle_failure(
        self: &Arc<Self>,
        message: InboundMessage,
        content: String,
        reason: String,
        transformation_id: Uuid,
        attempt: u32,
        elapsed_ms: u64,
    ) {
        if attempt < self.retry.policy().max_attempts {
            self.metrics.record_transformation_retry();
            tracing::info!(
                message_id = %message.message_id,
                attempt,
                reason = %reason,
                "Transformation will retry"
            );
            self.retry
                .schedule(attempt, self.reprocess(message, attempt + 1));
            return;
        }

        // Attempts exhausted: dead-letter
        self.metrics.record_transformation_failure();
        self.metrics.record_dead_letter();

        let mut properties = HashMap::new();
        properties.insert("failureReason".to_string(), reason.clone());
        properties.insert("retryAttempts".to_string(), attempt.to_string());
        properties.insert(
            "transformationType".to_string(),
            type_name(self.settings.transformation_type),
        );
        properties.insert("transformationId".to_string(), transformation_id.to_string());

        if let Err(e) = self
            .broker
            .publish(&self.settings.dead_letter_destination, &content, &properties)
            .await
        {
            tracing::error!(
                message_id = %message.message_id,
                error = %e,
                "Dead-letter publish failed; record is the only trace"
            );
        }

        let record = TransformationRecord {
            transformation_id,
            input_message_id: message.message_id.clone(),
            output_message_id: None,
            input_message_type: detect_input_type(&content),
            output_message_type: None,
            transformation_type: self.settings.transformation_type,
            status: TransformationStatus::DeadLetter,
            input_queue: self.settings.input_queue.clone(),
            output_queue: self.settings.output_queue.clone(),
            correlation_id: Some(propagated_correlation(&message)),
            timestamp: Utc::now(),
            processing_time_ms: elapsed_ms,
            attempt_count: attempt,
            error_message: Some(reason),
            warnings: Vec::new(),
            confidence_score: None,
            encrypted: false,
            input_content: Some(content),
            output_content: None,
            input_encrypted_content: None,
            input_encrypted_data_key: None,
            input_encryption_iv: None,
            output_encrypted_content: None,
            output_encrypted_data_key: None,
            output_encryption_iv: None,
            encryption_algorithm: None,
            key_vault_key_id: None,
        };
        self.store_record(record).await;
    }

    /// A boxed re-entry into `process`, for the retry scheduler. Boxing
    /// keeps the retried future's type independent of the in-flight one.
    fn reprocess(
        self: &Arc<Self>,
        message: InboundMessage,
        attempt: u32,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let pipeline = self.clone();
        Box::pin(async move {
            pipeline.process(message, attempt).await;
        })
    }

    fn record_for(
        &self,
        message: &InboundMessage,
        content: &str,
        result: &TransformationResult,
        transformation_id: Uuid,
        attempt: u32,
        elapsed_ms: u64,
    ) -> TransformationRecord {
        TransformationRecord {
            transformation_id,
            input_message_id: message.message_id.clone(),
            output_message_id: None,
            input_message_type: detect_input_type(content),
            output_message_type: result.output_message_type.clone(),
            transformation_type: self.settings.transformation_type,
            status: result.status,
            input_queue: self.settings.input_queue.clone(),
            output_queue: self.settings.output_queue.clone(),
            correlation_id: message.correlation_id.clone(),
            timestamp: Utc::now(),
            processing_time_ms: elapsed_ms,
            attempt_count: attempt,
            error_message: result.error_message.clone(),
            warnings: result.warnings.clone(),
            confidence_score: result.confidence_score,
            encrypted: false,
            input_content: Some(content.to_string()),
            output_content: None,
            input_encrypted_content: None,
            input_encrypted_data_key: None,
            input_encryption_iv: None,
            output_encrypted_content: None,
            output_encrypted_data_key: None,
            output_encryption_iv: None,
            encryption_algorithm: None,
            key_vault_key_id: None,
        }
    }

    async fn store_record(&self, record: TransformationRecord) {
        match self.records.save_transformation(record).await {
            Ok(_) => self.metrics.record_stored(),
            Err(e) => {
                self.metrics.record_store_failure();
                tracing::error!(error = %e, "Transformation record store failed");
            }
        }
    }
}

/// The output's correlation id: the input's when present, otherwise the
/// input broker message id, so every transformation traces back to its
/// trigger.
fn propagated_correlation(message: &InboundMessage) -> String {
    message
        .correlation_id
        .clone()
        .unwrap_or_else(|| message.message_id.clone())
}

fn detect_input_type(content: &str) -> Option<String> {
    SwiftMessage::parse(content)
        .ok()
        .and_then(|m| m.message_type())
        .map(|t| format!("MT{t}"))
}

/// Wire name of a transformation type (its serde identifier).
fn type_name(transformation_type: TransformationType) -> String {
    match serde_json::to_value(transformation_type) {
        Ok(serde_json::Value::String(name)) => name,
        _ => format!("{transformation_type:?}"),
    }
}
