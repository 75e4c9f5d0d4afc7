use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded-mode status and the local hub connection count, logging
/// backend connectivity issues along the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.control_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "control store health check failed");
            }
        }
        None => warn!("control store not installed"),
    }

    let connected_hubs = state.hubs().len();
    if state.is_degraded().await {
        HealthResponse::degraded(connected_hubs)
    } else {
        HealthResponse::ok(connected_hubs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn reports_degraded_until_the_control_channel_is_up() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());

        let status = health_status(&state).await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.connected_hubs, 0);
    }

    #[tokio::test]
    async fn counts_locally_connected_hubs() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let device_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel::<Message>();
        state
            .hubs()
            .insert(device_id, crate::state::HubConnection { device_id, tx });

        let status = health_status(&state).await;
        assert_eq!(status.connected_hubs, 1);
    }
}
