//! Keeps the Redis-backed services wired into the shared state, and the
//! degraded flag accurate when the broker is unreachable.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::state::SharedState;

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connect to Redis and keep the shared state in degraded mode while the
/// broker is unavailable.
///
/// On every successful connection the publisher, node registry and raw
/// connection slots are reinstalled; on ping failure they are cleared and
/// the process degrades until a reconnect succeeds.
pub async fn run(state: SharedState, client: redis::Client) {
    let mut delay = INITIAL_DELAY;

    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                state.install_redis(conn.clone()).await;
                info!("redis connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                let mut conn = conn;
                loop {
                    match redis::cmd("PING").query_async::<String>(&mut conn).await {
                        Ok(_) => sleep(HEALTH_POLL_INTERVAL).await,
                        Err(err) => {
                            warn!(error = %err, "redis ping failed; entering degraded mode");
                            state.clear_redis().await;
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "redis connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
