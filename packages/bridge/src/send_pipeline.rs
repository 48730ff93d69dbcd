//! Dual-path send pipeline: exclusion check, broker publish, async store.
//!
//! The producer gets a response as soon as the publish outcome is known.
//! Storage happens on the worker pool after the response is shaped; a
//! store failure is visible in logs and counters only and never mutates
//! the response.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use meridian_exclusion::ExclusionEngine;

use crate::error::{BridgeError, BridgeResult};
use crate::gateway::BrokerGateway;
use crate::metrics::BridgeMetrics;
use crate::record_store::RecordStore;
use crate::records::{MessageStatus, SendRequest, SendResponse};
use crate::workers::StorageWorkerPool;

/// Orchestrates exclusion, publish, and fire-and-forget store.
pub struct SendPipeline {
    exclusion: Arc<ExclusionEngine>,
    broker: Arc<dyn BrokerGateway>,
    workers: Arc<StorageWorkerPool>,
    records: Arc<RecordStore>,
    metrics: Arc<BridgeMetrics>,
}

impl SendPipeline {
    pub fn new(
        exclusion: Arc<ExclusionEngine>,
        broker: Arc<dyn BrokerGateway>,
        workers: Arc<StorageWorkerPool>,
        records: Arc<RecordStore>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            exclusion,
            broker,
            workers,
            records,
            metrics,
        }
    }

    /// Drive one message through the pipeline under a fresh message id.
    pub async fn send(
        &self,
        request: SendRequest,
        message_type: Option<&str>,
    ) -> BridgeResult<SendResponse> {
        request.validate().map_err(BridgeError::Validation)?;
        let message_id = Uuid::new_v4();
        self.dispatch(request, message_id, message_type, None).await
    }

    /// Re-drive a stored message: decrypt it, allocate a new id, and run
    /// the same pipeline. The new record is stored as `REPUBLISHED`.
    pub async fn republish(&self, message_id: Uuid) -> BridgeResult<SendResponse> {
        let stored = self.records.fetch_message(message_id).await?;
        let content = stored.content.ok_or_else(|| {
            BridgeError::Store("stored record has no readable content".into())
        })?;

        let request = SendRequest {
            content,
            destination: stored.destination,
            correlation_id: stored.correlation_id,
        };
        let new_id = Uuid::new_v4();
        tracing::info!(original = %message_id, republished = %new_id, "Republishing stored message");
        self.dispatch(request, new_id, None, Some(MessageStatus::Republished))
            .await
    }

    async fn dispatch(
        &self,
        request: SendRequest,
        message_id: Uuid,
        message_type: Option<&str>,
        stored_status: Option<MessageStatus>,
    ) -> BridgeResult<SendResponse> {
        // 1. Exclusion: no publish, no store, immediate response.
        if self
            .exclusion
            .should_exclude(&request.content, message_type)
        {
            self.metrics.record_excluded();
            tracing::info!(message_id = %message_id, destination = %request.destination, "Message excluded");
            return Ok(SendResponse {
                message_id,
                status: MessageStatus::Excluded,
                destination: request.destination,
                timestamp: Utc::now(),
            });
        }

        // 2. Publish. Failure is non-fatal: it shapes the response and the
        // pipeline carries on to the store.
        let mut properties = HashMap::new();
        properties.insert("messageId".to_string(), message_id.to_string());
        if let Some(correlation_id) = &request.correlation_id {
            properties.insert("correlationId".to_string(), correlation_id.clone());
        }

        let publish_status = match self
            .broker
            .publish(&request.destination, &request.content, &properties)
            .await
        {
            Ok(()) => {
                self.metrics.record_sent();
                MessageStatus::Sent
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                tracing::error!(message_id = %message_id, error = %e, "Broker publish failed");
                MessageStatus::Failed
            }
        };

        // 3. Fire-and-forget store. The response below does not wait for
        // it and never reflects its outcome.
        let record_status = stored_status.unwrap_or(publish_status);
        let records = self.records.clone();
        let metrics = self.metrics.clone();
        let content = request.content;
        let destination = request.destination.clone();
        let correlation_id = request.correlation_id;
        self.workers.submit(async move {
            match records
                .save_message(
                    message_id,
                    &destination,
                    correlation_id.as_deref(),
                    record_status,
                    &content,
                )
                .await
            {
                Ok(_) => metrics.record_stored(),
                Err(e) => {
                    metrics.record_store_failure();
                    tracing::error!(message_id = %message_id, error = %e, "Message store failed");
                }
            }
        });

        let response_status = match stored_status {
            Some(MessageStatus::Republished) if publish_status == MessageStatus::Sent => {
                MessageStatus::Republished
            }
            _ => publish_status,
        };

        Ok(SendResponse {
            message_id,
            status: response_status,
            destination: request.destination,
            timestamp: Utc::now(),
        })
    }
}
