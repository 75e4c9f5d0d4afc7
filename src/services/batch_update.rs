//! Coalescing of high-frequency "last used" timestamp writes.
//!
//! Request paths record token and session activity thousands of times per
//! flush interval; writing each one through would hammer the backing stores
//! for telemetry nobody reads at that resolution. Instead, enqueue
//! operations push intents onto a bounded channel and a single consumer
//! task coalesces them per key, flushing on a fixed tick: one bulk write
//! for tokens, one write per session key against the session store. Flush
//! failures are logged and the drained entries are dropped; the data is
//! best-effort by design.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use redis::AsyncCommands;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::SharedState;

/// Key prefix for session last-used entries in the session store.
const SESSION_LAST_USED_PREFIX: &str = "session:last-used:";

/// A pending last-used update recorded by a request path.
#[derive(Debug)]
pub enum LastUsedUpdate {
    /// An API token was used.
    ///
    /// Carries no per-use instant: tokens go out as one bulk write stamped
    /// with the flush time, and per-use instants within one interval are
    /// below the resolution this data is read at.
    Token {
        /// Token identifier.
        token_id: Uuid,
    },
    /// A login session was used.
    Session {
        /// Session identifier.
        session_id: String,
        /// When the use happened.
        at: SystemTime,
    },
}

/// Non-blocking enqueue side of the batch aggregator.
///
/// Safe to call from any request path: recording an intent is a bounded
/// channel send that never performs I/O. When the queue is full the update
/// is dropped with a warning rather than applying backpressure to requests.
#[derive(Clone)]
pub struct BatchUpdateHandle {
    tx: mpsc::Sender<LastUsedUpdate>,
}

impl BatchUpdateHandle {
    /// Wrap the sender half of the update queue.
    pub fn new(tx: mpsc::Sender<LastUsedUpdate>) -> Self {
        Self { tx }
    }

    /// Record that an API token was just used.
    pub fn token_used(&self, token_id: Uuid) {
        self.enqueue(LastUsedUpdate::Token { token_id });
    }

    /// Record that a login session was just used.
    pub fn session_used(&self, session_id: String) {
        self.enqueue(LastUsedUpdate::Session {
            session_id,
            at: SystemTime::now(),
        });
    }

    fn enqueue(&self, update: LastUsedUpdate) {
        if let Err(err) = self.tx.try_send(update) {
            warn!(error = %err, "dropping last-used update; queue full or closed");
        }
    }
}

/// Consume the update queue, coalescing entries and flushing on a fixed tick.
///
/// Runs for the lifetime of the process; errors during a flush never stop
/// the loop.
pub async fn run(state: SharedState, mut rx: mpsc::Receiver<LastUsedUpdate>) {
    let mut interval = tokio::time::interval(state.config().batch_flush_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tokens: HashSet<Uuid> = HashSet::new();
    let mut sessions: HashMap<String, SystemTime> = HashMap::new();

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(update) => record(update, &mut tokens, &mut sessions),
                None => {
                    flush(&state, &mut tokens, &mut sessions).await;
                    break;
                }
            },
            _ = interval.tick() => flush(&state, &mut tokens, &mut sessions).await,
        }
    }
}

/// Fold an update into the pending sets; later entries for the same key win.
fn record(
    update: LastUsedUpdate,
    tokens: &mut HashSet<Uuid>,
    sessions: &mut HashMap<String, SystemTime>,
) {
    match update {
        LastUsedUpdate::Token { token_id } => {
            tokens.insert(token_id);
        }
        LastUsedUpdate::Session { session_id, at } => {
            sessions.insert(session_id, at);
        }
    }
}

/// Drain both pending sets and write them out, swallowing failures.
async fn flush(
    state: &SharedState,
    tokens: &mut HashSet<Uuid>,
    sessions: &mut HashMap<String, SystemTime>,
) {
    let pending_tokens = std::mem::take(tokens);
    let pending_sessions = std::mem::take(sessions);

    if !pending_tokens.is_empty() {
        flush_tokens(state, pending_tokens).await;
    }
    if !pending_sessions.is_empty() {
        flush_sessions(state, pending_sessions).await;
    }
}

/// One bulk update covering every pending token, stamped with the flush
/// instant.
async fn flush_tokens(state: &SharedState, pending: HashSet<Uuid>) {
    let count = pending.len();
    let Some(store) = state.control_store().await else {
        warn!(count, "dropping token last-used updates; no store installed");
        return;
    };

    let token_ids: Vec<Uuid> = pending.into_iter().collect();
    match store
        .bulk_update_token_last_used(token_ids, SystemTime::now())
        .await
    {
        Ok(()) => debug!(count, "flushed token last-used updates"),
        Err(err) => warn!(error = %err, count, "token last-used flush failed; entries dropped"),
    }
}

/// One write per session key; the session store has no bulk primitive.
async fn flush_sessions(state: &SharedState, pending: HashMap<String, SystemTime>) {
    let count = pending.len();
    let Some(mut conn) = state.redis_connection().await else {
        warn!(count, "dropping session last-used updates; degraded mode");
        return;
    };

    let mut written = 0usize;
    for (session_id, at) in pending {
        let key = format!("{SESSION_LAST_USED_PREFIX}{session_id}");
        let value = OffsetDateTime::from(at)
            .format(&Rfc3339)
            .unwrap_or_else(|_| "invalid-timestamp".into());
        match conn.set::<_, _, ()>(&key, value).await {
            Ok(()) => written += 1,
            Err(err) => {
                warn!(error = %err, %key, "session last-used write failed; entry dropped");
            }
        }
    }
    debug!(written, count, "flushed session last-used updates");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::control_store::MemoryControlStore, state::AppState};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pending_entries_coalesce_per_key() {
        let mut tokens = HashSet::new();
        let mut sessions = HashMap::new();
        let token_id = Uuid::new_v4();
        let early = SystemTime::UNIX_EPOCH;
        let late = SystemTime::now();

        record(LastUsedUpdate::Token { token_id }, &mut tokens, &mut sessions);
        record(LastUsedUpdate::Token { token_id }, &mut tokens, &mut sessions);
        assert_eq!(tokens.len(), 1);

        record(
            LastUsedUpdate::Session {
                session_id: "abc".into(),
                at: early,
            },
            &mut tokens,
            &mut sessions,
        );
        record(
            LastUsedUpdate::Session {
                session_id: "abc".into(),
                at: late,
            },
            &mut tokens,
            &mut sessions,
        );
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions["abc"], late);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_token_updates_flush_on_tick() {
        let config = AppConfig {
            batch_flush_interval: Duration::from_millis(50),
            ..AppConfig::default()
        };
        let (state, rx) = AppState::new(config);
        let store = MemoryControlStore::new();
        state.install_control_store(Arc::new(store.clone())).await;

        let consumer = tokio::spawn(run(state.clone(), rx));

        let token_id = Uuid::new_v4();
        state.batch().token_used(token_id);

        // Paused time auto-advances through the flush tick.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.token_last_used(token_id).is_some());
        consumer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_store_drops_entries_silently() {
        let config = AppConfig {
            batch_flush_interval: Duration::from_millis(50),
            ..AppConfig::default()
        };
        let (state, rx) = AppState::new(config);
        let consumer = tokio::spawn(run(state.clone(), rx));

        state.batch().token_used(Uuid::new_v4());
        state.batch().session_used("abc".into());
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Nothing to assert beyond the consumer surviving the flush.
        assert!(!consumer.is_finished());
        consumer.abort();
    }
}
