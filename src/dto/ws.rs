use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::control_channel::ShockerControlInfo;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from hub WebSocket clients.
#[serde(tag = "type")]
pub enum HubInboundMessage {
    /// First message on a fresh socket, naming the device the hub serves.
    #[serde(rename = "identification")]
    Identification {
        /// Device id of the connecting hub.
        id: Uuid,
    },
    /// Periodic keep-alive.
    #[serde(rename = "heartbeat")]
    Heartbeat,
    /// Anything this server version does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to a connected hub.
#[serde(tag = "type")]
pub enum HubOutboundMessage {
    /// Positive acknowledgement after successful identification.
    #[serde(rename = "identified")]
    Identified {
        /// Device id the connection is now registered under.
        id: Uuid,
    },
    /// Clamped commands for shockers attached to this hub.
    #[serde(rename = "control")]
    Control {
        /// Commands to translate onto the RF wire.
        commands: Vec<ShockerControlInfo>,
    },
}
