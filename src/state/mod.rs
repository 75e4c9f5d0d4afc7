//! Shared application state: live hub connections, the control channel and
//! store slots, and the degraded-mode flag.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        control_store::ControlStore,
        node_registry::{NodeRegistry, RedisNodeRegistry},
    },
    error::ServiceError,
    services::{
        batch_update::{BatchUpdateHandle, LastUsedUpdate},
        control_channel::{ControlPublisher, RedisControlPublisher},
    },
};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Capacity of the last-used update queue; enqueues beyond this are dropped.
const BATCH_QUEUE_CAPACITY: usize = 4_096;

#[derive(Clone)]
/// Handle used to push messages to a connected hub's WebSocket.
pub struct HubConnection {
    /// Device id the hub identified as.
    pub device_id: Uuid,
    /// Writer channel feeding the hub's socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing live connections and backend handles.
pub struct AppState {
    config: AppConfig,
    redis: RwLock<Option<MultiplexedConnection>>,
    control_store: RwLock<Option<Arc<dyn ControlStore>>>,
    publisher: RwLock<Option<Arc<dyn ControlPublisher>>>,
    node_registry: RwLock<Option<Arc<dyn NodeRegistry>>>,
    hubs: DashMap<Uuid, HubConnection>,
    degraded: watch::Sender<bool>,
    batch: BatchUpdateHandle,
}

impl AppState {
    /// Construct the state wrapped in an [`Arc`] so it can be cloned cheaply,
    /// along with the receiver half of the last-used update queue.
    ///
    /// The application starts in degraded mode until a control channel
    /// connection is installed.
    pub fn new(config: AppConfig) -> (SharedState, mpsc::Receiver<LastUsedUpdate>) {
        let (degraded_tx, _rx) = watch::channel(true);
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_CAPACITY);
        let state = Arc::new(Self {
            config,
            redis: RwLock::new(None),
            control_store: RwLock::new(None),
            publisher: RwLock::new(None),
            node_registry: RwLock::new(None),
            hubs: DashMap::new(),
            degraded: degraded_tx,
            batch: BatchUpdateHandle::new(batch_tx),
        });
        (state, batch_rx)
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current multiplexed Redis connection, if one is installed.
    pub async fn redis_connection(&self) -> Option<MultiplexedConnection> {
        let guard = self.redis.read().await;
        guard.as_ref().cloned()
    }

    /// Install a fresh Redis connection, wire the publisher and node registry
    /// over it, and leave degraded mode.
    pub async fn install_redis(&self, conn: MultiplexedConnection) {
        {
            let mut guard = self.publisher.write().await;
            *guard = Some(Arc::new(RedisControlPublisher::new(
                conn.clone(),
                self.config.control_channel.clone(),
            )));
        }
        {
            let mut guard = self.node_registry.write().await;
            *guard = Some(Arc::new(RedisNodeRegistry::new(conn.clone())));
        }
        {
            let mut guard = self.redis.write().await;
            *guard = Some(conn);
        }
        self.update_degraded(false).await;
    }

    /// Drop the Redis connection and everything built on it, entering
    /// degraded mode.
    pub async fn clear_redis(&self) {
        {
            let mut guard = self.publisher.write().await;
            guard.take();
        }
        {
            let mut guard = self.node_registry.write().await;
            guard.take();
        }
        {
            let mut guard = self.redis.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.redis.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of live hub sockets keyed by device id.
    pub fn hubs(&self) -> &DashMap<Uuid, HubConnection> {
        &self.hubs
    }

    /// Obtain a handle to the control store, if one is installed.
    pub async fn control_store(&self) -> Option<Arc<dyn ControlStore>> {
        let guard = self.control_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install the control store implementation.
    pub async fn install_control_store(&self, store: Arc<dyn ControlStore>) {
        let mut guard = self.control_store.write().await;
        *guard = Some(store);
    }

    /// Control store or a degraded-mode error.
    pub async fn require_control_store(&self) -> Result<Arc<dyn ControlStore>, ServiceError> {
        self.control_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a control publisher directly, bypassing Redis wiring. Used by
    /// tests and single-process development.
    pub async fn install_publisher(&self, publisher: Arc<dyn ControlPublisher>) {
        let mut guard = self.publisher.write().await;
        *guard = Some(publisher);
    }

    /// Control publisher or a degraded-mode error.
    pub async fn require_publisher(&self) -> Result<Arc<dyn ControlPublisher>, ServiceError> {
        let guard = self.publisher.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Install a node registry directly, bypassing Redis wiring. Used by
    /// tests and single-process development.
    pub async fn install_node_registry(&self, registry: Arc<dyn NodeRegistry>) {
        let mut guard = self.node_registry.write().await;
        *guard = Some(registry);
    }

    /// Node registry or a degraded-mode error.
    pub async fn require_node_registry(&self) -> Result<Arc<dyn NodeRegistry>, ServiceError> {
        let guard = self.node_registry.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Non-blocking enqueue handle for last-used bookkeeping.
    pub fn batch(&self) -> &BatchUpdateHandle {
        &self.batch
    }

    /// Update and broadcast the degraded flag when the value changes.
    async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
