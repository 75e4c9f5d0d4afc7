use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the control channel is unreachable.
    pub status: String,
    /// Hubs holding a live WebSocket on this process right now.
    pub connected_hubs: usize,
}

impl HealthResponse {
    /// Control channel is up and commands can be dispatched.
    pub fn ok(connected_hubs: usize) -> Self {
        Self {
            status: "ok".to_string(),
            connected_hubs,
        }
    }

    /// Control channel is down; control requests will be refused until the
    /// supervisor reconnects.
    pub fn degraded(connected_hubs: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            connected_hubs,
        }
    }
}
