//! Meridian-Bridge: pub/sub to encrypted object-store message bridge
//!
//! Producers submit messages over HTTP; the bridge publishes each one to
//! the broker, persists an envelope-encrypted record in the object store
//! on a bounded worker pool, and optionally consumes a broker queue to
//! transform SWIFT-family payloads and re-publish them, storing both
//! sides. A rule-driven exclusion engine can hold messages back before
//! they ever reach the broker.
//!
//! Modules:
//! - `gateway`: opaque broker and object-store clients
//! - `records` / `record_store`: typed records, envelope encryption at rest
//! - `workers`: bounded fire-and-forget storage executor
//! - `send_pipeline`: exclusion -> publish -> async store
//! - `transformer`: consume -> transform -> publish -> store, with retry
//! - `retry` / `dlq`: backoff scheduling and dead-letter handling
//! - `api`: the HTTP surface
//! - `config` / `metrics` / `error`: ambient concerns

pub mod api;
pub mod config;
pub mod dlq;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod record_store;
pub mod records;
pub mod retry;
pub mod send_pipeline;
pub mod transformer;
pub mod workers;

// Re-exports
pub use api::{router, AppState};
pub use config::{
    BridgeConfig, BrokerSettings, EncryptionSettings, ExclusionSeed, StoreSettings,
    TransformerConfig, WorkerSettings,
};
pub use dlq::{DeadLetterListener, DeadLetterSettings};
pub use error::{BridgeError, BridgeResult};
pub use gateway::{
    BrokerGateway, InMemoryBroker, InMemoryObjectStore, InboundMessage, MessageHandler,
    MessagePayload, ObjectStoreGateway, PublishedMessage,
};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use record_store::RecordStore;
pub use records::{
    MessageStatus, SendRequest, SendResponse, StoredMessageRecord, TransformationRecord,
};
pub use retry::{RetryPolicy, RetryService};
pub use send_pipeline::SendPipeline;
pub use transformer::{TransformationPipeline, TransformerSettings};
pub use workers::StorageWorkerPool;
