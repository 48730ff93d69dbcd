//! Object-store gateway: blob CRUD under a container.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BridgeError, BridgeResult};

/// Opaque blob store client.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Create the container when absent.
    async fn ensure_container(&self, container: &str) -> BridgeResult<()>;

    /// Write a blob, replacing any existing content.
    async fn put(&self, container: &str, blob_name: &str, bytes: Vec<u8>) -> BridgeResult<()>;

    /// Read a blob. `NotFound` when the blob does not exist.
    async fn get(&self, container: &str, blob_name: &str) -> BridgeResult<Vec<u8>>;

    /// Blob names under `prefix`, at most `limit`, in name order.
    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
        limit: usize,
    ) -> BridgeResult<Vec<String>>;

    /// Delete a blob. `NotFound` when the blob does not exist.
    async fn delete(&self, container: &str, blob_name: &str) -> BridgeResult<()>;
}

/// In-memory store for development profiles and tests.
pub struct InMemoryObjectStore {
    containers: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    fail_puts: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
        }
    }

    /// Make every `put` fail, to exercise the async-store error path.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of blobs in `container`.
    pub fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Overwrite raw blob bytes, bypassing the gateway. Test hook for
    /// tamper scenarios.
    pub fn corrupt_blob(
        &self,
        container: &str,
        blob_name: &str,
        mutate: impl FnOnce(&mut Vec<u8>),
    ) -> bool {
        let mut containers = self.containers.write();
        match containers.get_mut(container).and_then(|c| c.get_mut(blob_name)) {
            Some(bytes) => {
                mutate(bytes);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStoreGateway for InMemoryObjectStore {
    async fn ensure_container(&self, container: &str) -> BridgeResult<()> {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn put(&self, container: &str, blob_name: &str, bytes: Vec<u8>) -> BridgeResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BridgeError::Store("simulated put failure".into()));
        }
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(blob_name.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, container: &str, blob_name: &str) -> BridgeResult<Vec<u8>> {
        self.containers
            .read()
            .get(container)
            .and_then(|c| c.get(blob_name))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(blob_name.to_string()))
    }

    async fn list(
        &self,
        container: &str,
        prefix: Option<&str>,
        limit: usize,
    ) -> BridgeResult<Vec<String>> {
        let containers = self.containers.read();
        let Some(blobs) = containers.get(container) else {
            return Ok(Vec::new());
        };
        Ok(blobs
            .keys()
            .filter(|name| prefix.map(|p| name.starts_with(p)).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, container: &str, blob_name: &str) -> BridgeResult<()> {
        let mut containers = self.containers.write();
        let removed = containers
            .get_mut(container)
            .and_then(|c| c.remove(blob_name));
        match removed {
            Some(_) => Ok(()),
            None => Err(BridgeError::NotFound(blob_name.to_string())),
        }
    }
}
