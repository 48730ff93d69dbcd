//! Opaque gateways to the broker and the object store.
//!
//! The bridge depends on nothing broker- or store-specific beyond these
//! traits: topic/queue publish, durable-queue consume, and blob CRUD. The
//! in-memory implementations back development profiles and the test
//! suites.

pub mod broker;
pub mod store;

pub use broker::{
    BrokerGateway, InMemoryBroker, InboundMessage, MessageHandler, MessagePayload,
    PublishedMessage,
};
pub use store::{InMemoryObjectStore, ObjectStoreGateway};
