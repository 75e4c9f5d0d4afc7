use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::hub_gateway, state::SharedState};

#[utoipa::path(
    get,
    path = "/hubs/ws",
    tag = "hubs",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a hub WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    ws.on_upgrade(move |socket| hub_gateway::handle_socket(shared_state.clone(), socket))
}

/// Configure the hub WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/hubs/ws", get(ws_handler))
}
