//! Read-side access to the shared gateway node registry.
//!
//! Gateways register themselves under a TTL'd key per node plus a secondary
//! index set per environment; this module only reads. Expired nodes simply
//! disappear from the key space, so a missing value for an indexed fqdn is a
//! normal occurrence, not an error.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, warn};

use crate::dao::models::LcgNode;
use crate::dao::storage::{StorageError, StorageResult};

/// Key prefix for individual node registrations.
const NODE_KEY_PREFIX: &str = "lcg:node:";
/// Key prefix for the per-environment fqdn index sets.
const ENV_INDEX_PREFIX: &str = "lcg:env:";

/// Read access to the live gateway registrations for one environment.
pub trait NodeRegistry: Send + Sync {
    /// All currently registered nodes serving `environment`.
    fn nodes_in_environment(
        &self,
        environment: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<LcgNode>>>;
}

/// [`NodeRegistry`] reading from the shared Redis key space.
#[derive(Clone)]
pub struct RedisNodeRegistry {
    conn: MultiplexedConnection,
}

impl RedisNodeRegistry {
    /// Wrap an established connection. The connection multiplexes, so clones
    /// are cheap and safe to use concurrently.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

impl NodeRegistry for RedisNodeRegistry {
    fn nodes_in_environment(
        &self,
        environment: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<LcgNode>>> {
        let mut conn = self.conn.clone();
        let environment = environment.to_string();

        Box::pin(async move {
            let index_key = format!("{ENV_INDEX_PREFIX}{environment}");
            let fqdns: Vec<String> = conn
                .smembers(&index_key)
                .await
                .map_err(|err| StorageError::unavailable("reading node index", err))?;

            if fqdns.is_empty() {
                return Ok(Vec::new());
            }

            let node_keys: Vec<String> = fqdns
                .iter()
                .map(|fqdn| format!("{NODE_KEY_PREFIX}{fqdn}"))
                .collect();
            let values: Vec<Option<String>> = conn
                .mget(&node_keys)
                .await
                .map_err(|err| StorageError::unavailable("reading node entries", err))?;

            Ok(decode_nodes(&environment, node_keys.into_iter().zip(values)))
        })
    }
}

/// Decode the registry values read for one environment.
///
/// Missing and undecodable entries are both skipped: a missing value means
/// the TTL expired between the index read and the value read, and a single
/// bad registration must not take gateway assignment down for everyone.
fn decode_nodes(
    environment: &str,
    entries: impl IntoIterator<Item = (String, Option<String>)>,
) -> Vec<LcgNode> {
    let mut nodes = Vec::new();
    for (key, value) in entries {
        let Some(payload) = value else {
            debug!(%key, "indexed gateway node has expired");
            continue;
        };

        match serde_json::from_str::<LcgNode>(&payload) {
            Ok(node) if node.environment == environment => nodes.push(node),
            Ok(_) => {}
            Err(err) => {
                warn!(%key, error = %err, "skipping undecodable gateway node entry");
            }
        }
    }
    nodes
}

/// In-memory [`NodeRegistry`] used by tests and storage-less development.
#[derive(Clone, Default)]
pub struct MemoryNodeRegistry {
    nodes: Arc<Mutex<Vec<LcgNode>>>,
}

impl MemoryNodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any previous entry with the same fqdn.
    pub fn register(&self, node: LcgNode) {
        let mut nodes = self.nodes.lock().expect("memory registry poisoned");
        nodes.retain(|existing| existing.fqdn != node.fqdn);
        nodes.push(node);
    }
}

impl NodeRegistry for MemoryNodeRegistry {
    fn nodes_in_environment(
        &self,
        environment: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<LcgNode>>> {
        let nodes = self.nodes.clone();
        let environment = environment.to_string();
        Box::pin(async move {
            let nodes = nodes.lock().expect("memory registry poisoned");
            Ok(nodes
                .iter()
                .filter(|node| node.environment == environment)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(fqdn: &str, environment: &str) -> String {
        serde_json::to_string(&LcgNode {
            fqdn: fqdn.into(),
            country: "DE".parse().unwrap(),
            load: 3,
            environment: environment.into(),
        })
        .unwrap()
    }

    #[test]
    fn one_bad_entry_does_not_poison_the_read() {
        let entries = vec![
            ("lcg:node:good.gateway.test".to_string(), Some(payload("good.gateway.test", "production"))),
            ("lcg:node:bad.gateway.test".to_string(), Some("{not json".to_string())),
            ("lcg:node:gone.gateway.test".to_string(), None),
            ("lcg:node:other.gateway.test".to_string(), Some(payload("other.gateway.test", "staging"))),
        ];

        let nodes = decode_nodes("production", entries);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].fqdn, "good.gateway.test");
    }
}
