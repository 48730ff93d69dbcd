//! Dead-letter listener: audit storage and windowed alerting.
//!
//! Subscribes to the dead-letter destination, stores each payload as a
//! `FAILED` message record for audit, and tracks an hourly count that
//! rolls over on read. Crossing the warn threshold logs a warning; the
//! critical threshold logs an error.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BridgeResult;
use crate::gateway::{BrokerGateway, InboundMessage, MessageHandler, MessagePayload};
use crate::metrics::BridgeMetrics;
use crate::record_store::RecordStore;
use crate::records::MessageStatus;

const WINDOW_MS: i64 = 60 * 60 * 1000;

/// Alert thresholds for the hourly dead-letter count.
#[derive(Debug, Clone)]
pub struct DeadLetterSettings {
    pub destination: String,
    pub warn_threshold: u64,
    pub critical_threshold: u64,
}

/// Optional consumer of the dead-letter destination.
pub struct DeadLetterListener {
    records: Arc<RecordStore>,
    metrics: Arc<BridgeMetrics>,
    settings: DeadLetterSettings,
    window_count: AtomicU64,
    window_start_ms: AtomicI64,
}

struct DlqHandler {
    listener: Arc<DeadLetterListener>,
}

#[async_trait]
impl MessageHandler for DlqHandler {
    async fn on_message(&self, message: InboundMessage) {
        self.listener.on_dead_letter(message).await;
    }
}

impl DeadLetterListener {
    pub fn new(
        records: Arc<RecordStore>,
        metrics: Arc<BridgeMetrics>,
        settings: DeadLetterSettings,
    ) -> Self {
        Self {
            records,
            metrics,
            settings,
            window_count: AtomicU64::new(0),
            window_start_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Attach the listener to the dead-letter destination.
    pub async fn start(self: &Arc<Self>, broker: &Arc<dyn BrokerGateway>) -> BridgeResult<()> {
        let handler = Arc::new(DlqHandler {
            listener: self.clone(),
        });
        broker.subscribe(&self.settings.destination, handler).await?;
        tracing::info!(destination = %self.settings.destination, "Dead-letter listener attached");
        Ok(())
    }

    /// Hourly count, rolling the window over when it has expired.
    pub fn window_count(&self) -> u64 {
        self.roll_window();
        self.window_count.load(Ordering::Relaxed)
    }

    fn roll_window(&self) {
        let now = Utc::now().timestamp_millis();
        let started = self.window_start_ms.load(Ordering::Relaxed);
        if now - started >= WINDOW_MS
            && self
                .window_start_ms
                .compare_exchange(started, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.window_count.store(0, Ordering::Relaxed);
        }
    }

    async fn on_dead_letter(&self, message: InboundMessage) {
        self.roll_window();
        let count = self.window_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.record_dlq_received();

        let reason = message
            .properties
            .get("failureReason")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        if count > self.settings.critical_threshold {
            tracing::error!(
                count,
                threshold = self.settings.critical_threshold,
                reason = %reason,
                "Dead-letter volume critical"
            );
        } else if count > self.settings.warn_threshold {
            tracing::warn!(
                count,
                threshold = self.settings.warn_threshold,
                reason = %reason,
                "Dead-letter volume elevated"
            );
        }

        let content = match &message.payload {
            MessagePayload::Text(text) => text.clone(),
            MessagePayload::Binary(bytes) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    bytes = bytes.len(),
                    "Binary dead-letter payload stored as placeholder"
                );
                format!("<binary payload: {} bytes>", bytes.len())
            }
        };

        match self
            .records
            .save_message(
                Uuid::new_v4(),
                &self.settings.destination,
                message.correlation_id.as_deref(),
                MessageStatus::Failed,
                &content,
            )
            .await
        {
            Ok(record) => {
                self.metrics.record_stored();
                tracing::info!(
                    message_id = %record.message_id,
                    reason = %reason,
                    "Dead-lettered payload stored for audit"
                );
            }
            Err(e) => {
                self.metrics.record_store_failure();
                tracing::error!(error = %e, "Dead-letter audit store failed");
            }
        }
    }
}
