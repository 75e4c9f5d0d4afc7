//! The pub/sub channel carrying grouped control commands between API
//! processes and gateway processes.
//!
//! Any API instance may accept a control request for a device whose live
//! connection is held by a different instance, so delivery always goes
//! through the shared channel rather than the local connection registry.
//! Messages carry an id so consumers can drop duplicates if a publish is
//! ever retried.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{ControlType, ShockerModel};
use crate::services::hub_gateway;
use crate::state::SharedState;

/// How many recently seen message ids the subscriber remembers for
/// deduplication.
const DEDUPE_WINDOW: usize = 1_024;

const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

/// A single clamped command addressed to one shocker, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShockerControlInfo {
    /// Internal shocker identifier.
    pub id: Uuid,
    /// Hardware RF id the hub uses to address the physical unit.
    pub rf_id: u16,
    /// Clamped intensity, 1-100.
    pub intensity: u8,
    /// Clamped duration in milliseconds, 300-30000.
    pub duration_ms: u32,
    /// Command kind.
    pub control_type: ControlType,
    /// Hardware family, needed by the hub to pick the RF encoding.
    pub model: ShockerModel,
}

/// Fan-out message published once per control request, grouping commands by
/// their owning device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Unique id for consumer-side deduplication.
    pub message_id: Uuid,
    /// User who issued the commands.
    pub sender: Uuid,
    /// Commands grouped by owning device id, in request order.
    pub devices: IndexMap<Uuid, Vec<ShockerControlInfo>>,
}

/// Error raised when a control message cannot be handed to the channel.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The channel transport rejected the publish.
    #[error("control channel unavailable: {message}")]
    Unavailable {
        /// Human-readable context for the failure.
        message: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The message could not be encoded.
    #[error("failed to encode control message")]
    Encode(#[from] serde_json::Error),
}

/// Publisher half of the control channel.
pub trait ControlPublisher: Send + Sync {
    /// Publish one fan-out message to all subscribed gateway processes.
    fn publish(&self, message: ControlMessage) -> BoxFuture<'static, Result<(), PublishError>>;
}

/// [`ControlPublisher`] backed by Redis pub/sub.
#[derive(Clone)]
pub struct RedisControlPublisher {
    conn: MultiplexedConnection,
    channel: String,
}

impl RedisControlPublisher {
    /// Wrap an established connection publishing on `channel`.
    pub fn new(conn: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }
}

impl ControlPublisher for RedisControlPublisher {
    fn publish(&self, message: ControlMessage) -> BoxFuture<'static, Result<(), PublishError>> {
        let mut conn = self.conn.clone();
        let channel = self.channel.clone();
        Box::pin(async move {
            let payload = serde_json::to_string(&message)?;
            let _receivers: i64 =
                conn.publish(&channel, payload)
                    .await
                    .map_err(|err| PublishError::Unavailable {
                        message: format!("publishing to `{channel}`"),
                        source: Box::new(err),
                    })?;
            Ok(())
        })
    }
}

/// [`ControlPublisher`] that records messages in memory. Used by tests and
/// single-process development where no broker is running.
#[derive(Clone, Default)]
pub struct MemoryControlPublisher {
    messages: Arc<Mutex<Vec<ControlMessage>>>,
}

impl MemoryControlPublisher {
    /// Create an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every published message, in publish order.
    pub fn messages(&self) -> Vec<ControlMessage> {
        self.messages.lock().expect("memory publisher poisoned").clone()
    }
}

impl ControlPublisher for MemoryControlPublisher {
    fn publish(&self, message: ControlMessage) -> BoxFuture<'static, Result<(), PublishError>> {
        let messages = self.messages.clone();
        Box::pin(async move {
            messages.lock().expect("memory publisher poisoned").push(message);
            Ok(())
        })
    }
}

/// Bounded set of recently seen message ids.
///
/// Insertion order doubles as eviction order; once the window is full the
/// oldest id is forgotten. Duplicates inside the window are rejected.
pub(crate) struct RecentMessages {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RecentMessages {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an id, returning `false` if it was already in the window.
    pub(crate) fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Subscribe to the control channel and forward messages to locally
/// connected hubs, reconnecting with backoff when the broker drops us.
///
/// Devices connected to other gateway processes are silently skipped; their
/// own subscriber delivers to them.
pub async fn run_subscriber(state: SharedState, client: redis::Client) {
    let channel = state.config().control_channel.clone();
    let mut recent = RecentMessages::new(DEDUPE_WINDOW);
    let mut delay = RECONNECT_INITIAL_DELAY;

    loop {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(err) => {
                warn!(error = %err, "control channel subscriber connection failed");
                sleep(delay).await;
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                continue;
            }
        };

        if let Err(err) = pubsub.subscribe(&channel).await {
            warn!(error = %err, channel = %channel, "control channel subscribe failed");
            sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX_DELAY);
            continue;
        }

        info!(channel = %channel, "subscribed to control channel");
        delay = RECONNECT_INITIAL_DELAY;

        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "control channel payload was not a string");
                    continue;
                }
            };
            handle_payload(&state, &payload, &mut recent).await;
        }

        warn!(channel = %channel, "control channel stream ended; reconnecting");
    }
}

async fn handle_payload(state: &SharedState, payload: &str, recent: &mut RecentMessages) {
    let message: ControlMessage = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "dropping undecodable control message");
            return;
        }
    };

    if !recent.insert(message.message_id) {
        debug!(message_id = %message.message_id, "dropping duplicate control message");
        return;
    }

    for (device_id, commands) in &message.devices {
        hub_gateway::deliver_to_hub(state, *device_id, commands);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_rejected_inside_window() {
        let mut recent = RecentMessages::new(8);
        let id = Uuid::new_v4();
        assert!(recent.insert(id));
        assert!(!recent.insert(id));
    }

    #[test]
    fn oldest_id_is_forgotten_once_window_is_full() {
        let mut recent = RecentMessages::new(2);
        let first = Uuid::new_v4();
        assert!(recent.insert(first));
        assert!(recent.insert(Uuid::new_v4()));
        assert!(recent.insert(Uuid::new_v4()));
        // Evicted, so it is accepted again.
        assert!(recent.insert(first));
    }

    #[tokio::test]
    async fn memory_publisher_records_messages_in_order() {
        let publisher = MemoryControlPublisher::new();
        let first = ControlMessage {
            message_id: Uuid::new_v4(),
            sender: Uuid::new_v4(),
            devices: IndexMap::new(),
        };
        let second = ControlMessage {
            message_id: Uuid::new_v4(),
            sender: first.sender,
            devices: IndexMap::new(),
        };

        publisher.publish(first.clone()).await.unwrap();
        publisher.publish(second.clone()).await.unwrap();

        let messages = publisher.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, first.message_id);
        assert_eq!(messages[1].message_id, second.message_id);
    }
}
