//! Store abstraction for shocker grants, control audit logs and coalesced
//! token bookkeeping.
//!
//! The relational backend that owns the real schema lives outside this
//! service; deployments implement [`ControlStore`] over it. The in-memory
//! implementation here backs tests and single-process development setups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{ControlLogEntry, ShockerGrant};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for grants and control audit data.
pub trait ControlStore: Send + Sync {
    /// Shockers the user owns directly through their own hubs.
    fn owned_grants(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShockerGrant>>>;
    /// Shockers shared with the user by other owners.
    fn shared_grants(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShockerGrant>>>;
    /// Append one audit row per accepted command and commit them together.
    fn append_control_logs(
        &self,
        entries: Vec<ControlLogEntry>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Set the last-used timestamp for every listed API token in one write.
    fn bulk_update_token_last_used(
        &self,
        token_ids: Vec<Uuid>,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

#[derive(Default)]
struct MemoryInner {
    owned: HashMap<Uuid, Vec<ShockerGrant>>,
    shared: HashMap<Uuid, Vec<ShockerGrant>>,
    logs: Vec<ControlLogEntry>,
    token_last_used: HashMap<Uuid, SystemTime>,
}

/// In-memory [`ControlStore`] used by tests and storage-less development.
#[derive(Clone, Default)]
pub struct MemoryControlStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryControlStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a grant the user owns directly.
    pub fn insert_owned(&self, user_id: Uuid, grant: ShockerGrant) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.owned.entry(user_id).or_default().push(grant);
    }

    /// Seed a grant shared with the user.
    pub fn insert_shared(&self, user_id: Uuid, grant: ShockerGrant) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.shared.entry(user_id).or_default().push(grant);
    }

    /// Snapshot of all persisted audit rows, in insertion order.
    pub fn logs(&self) -> Vec<ControlLogEntry> {
        self.inner.lock().expect("memory store poisoned").logs.clone()
    }

    /// Last-used timestamp recorded for a token, if any.
    pub fn token_last_used(&self, token_id: Uuid) -> Option<SystemTime> {
        self.inner
            .lock()
            .expect("memory store poisoned")
            .token_last_used
            .get(&token_id)
            .copied()
    }
}

impl ControlStore for MemoryControlStore {
    fn owned_grants(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShockerGrant>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let inner = inner.lock().expect("memory store poisoned");
            Ok(inner.owned.get(&user_id).cloned().unwrap_or_default())
        })
    }

    fn shared_grants(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShockerGrant>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let inner = inner.lock().expect("memory store poisoned");
            Ok(inner.shared.get(&user_id).cloned().unwrap_or_default())
        })
    }

    fn append_control_logs(
        &self,
        entries: Vec<ControlLogEntry>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("memory store poisoned");
            inner.logs.extend(entries);
            Ok(())
        })
    }

    fn bulk_update_token_last_used(
        &self,
        token_ids: Vec<Uuid>,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("memory store poisoned");
            for token_id in token_ids {
                inner.token_last_used.insert(token_id, at);
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
