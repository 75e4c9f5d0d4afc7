//! Lifecycle of hub WebSocket connections and delivery of control commands
//! to them.
//!
//! A hub identifies itself with its device id as the first frame, then stays
//! registered in the shared connection map until the socket closes. Control
//! messages arriving over the pub/sub channel are forwarded here to whatever
//! hubs this process holds; translation to the RF wire happens on the hub.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{HubInboundMessage, HubOutboundMessage},
    services::control_channel::ShockerControlInfo,
    state::{HubConnection, SharedState},
};

/// Handle the full lifecycle for an individual hub WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ident_timeout = state.config().hub_ident_timeout;
    let initial_message = match tokio::time::timeout(ident_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("hub identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound: HubInboundMessage = match serde_json::from_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse hub message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let HubInboundMessage::Identification { id: device_id } = inbound else {
        warn!("first hub message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    state.hubs().insert(
        device_id,
        HubConnection {
            device_id,
            tx: outbound_tx.clone(),
        },
    );
    info!(%device_id, "hub connected");

    send_to_hub_tx(&outbound_tx, &HubOutboundMessage::Identified { id: device_id });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<HubInboundMessage>(&text) {
                Ok(HubInboundMessage::Heartbeat) => {
                    debug!(%device_id, "hub heartbeat");
                }
                Ok(HubInboundMessage::Identification { .. }) => {
                    warn!(%device_id, "ignoring duplicate identification message");
                }
                Ok(HubInboundMessage::Unknown) => {
                    warn!(%device_id, "ignoring unknown hub message");
                }
                Err(err) => {
                    warn!(%device_id, error = %err, "failed to parse hub message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%device_id, "hub closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%device_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.hubs().remove(&device_id);
    info!(%device_id, "hub disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Forward clamped commands to the hub holding `device_id`, if it is
/// connected to this process.
///
/// Devices connected elsewhere are skipped; the gateway process holding them
/// consumes the same channel message. A dead writer drops the registration
/// so the hub re-identifies on reconnect.
pub fn deliver_to_hub(state: &SharedState, device_id: Uuid, commands: &[ShockerControlInfo]) {
    let Some(connection) = state.hubs().get(&device_id) else {
        debug!(%device_id, "device not connected to this process");
        return;
    };

    let tx = connection.tx.clone();
    drop(connection);

    let message = HubOutboundMessage::Control {
        commands: commands.to_vec(),
    };
    if !send_to_hub_tx(&tx, &message) {
        warn!(%device_id, "hub writer closed; dropping connection entry");
        state.hubs().remove(&device_id);
    }
}

/// Serialize a payload and push it onto the hub's writer channel.
///
/// Returns `false` when the writer is closed. Serialization failures are a
/// bug in this binary; they are logged and reported as delivered so callers
/// do not tear down the connection over them.
fn send_to_hub_tx(tx: &mpsc::UnboundedSender<Message>, message: &HubOutboundMessage) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize hub message");
            return true;
        }
    };

    tx.send(Message::Text(payload.into())).is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::{ControlType, ShockerModel},
        state::AppState,
    };

    fn info(id: Uuid) -> ShockerControlInfo {
        ShockerControlInfo {
            id,
            rf_id: 42,
            intensity: 50,
            duration_ms: 1_000,
            control_type: ControlType::Vibrate,
            model: ShockerModel::CaiXianlin,
        }
    }

    #[tokio::test]
    async fn delivers_control_frame_to_registered_hub() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let device_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .hubs()
            .insert(device_id, HubConnection { device_id, tx });

        let shocker = Uuid::new_v4();
        deliver_to_hub(&state, device_id, &[info(shocker)]);

        let frame = rx.recv().await.expect("frame delivered");
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "control");
        assert_eq!(value["commands"][0]["id"], shocker.to_string());
        assert_eq!(value["commands"][0]["rf_id"], 42);
    }

    #[tokio::test]
    async fn delivery_to_unconnected_device_is_a_noop() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        deliver_to_hub(&state, Uuid::new_v4(), &[info(Uuid::new_v4())]);
        assert!(state.hubs().is_empty());
    }

    #[tokio::test]
    async fn closed_writer_drops_the_registration() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let device_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        state
            .hubs()
            .insert(device_id, HubConnection { device_id, tx });

        deliver_to_hub(&state, device_id, &[info(Uuid::new_v4())]);
        assert!(state.hubs().is_empty());
    }
}
