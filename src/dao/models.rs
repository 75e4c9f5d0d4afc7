//! Persistence-facing entities shared between the store traits and the
//! control pipeline.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::geo::Alpha2CountryCode;

/// Kind of command a shocker can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    /// Cancel whatever the shocker is currently doing.
    Stop,
    /// Electric impulse at the requested intensity.
    Shock,
    /// Vibration motor pulse.
    Vibrate,
    /// Audible beep.
    Sound,
}

/// Hardware family of a shocker, determining the RF encoding the hub uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShockerModel {
    /// CaiXianlin collar family.
    CaiXianlin,
    /// Petrainer collar family.
    Petrainer,
    /// Petrainer 998DR variant with a distinct wire encoding.
    Petrainer998Dr,
}

/// A shocker the user may control, resolved from ownership or a share.
///
/// Carries everything the fan-out needs: the owning device so commands can be
/// grouped per hub, and the RF id used on the wire to the physical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShockerGrant {
    /// Internal shocker identifier.
    pub shocker_id: Uuid,
    /// Hardware RF id used on the device wire protocol.
    pub rf_id: u16,
    /// Hub the shocker is attached to.
    pub device_id: Uuid,
    /// Hardware family of the shocker.
    pub model: ShockerModel,
}

/// Audit row persisted for every accepted control command.
#[derive(Debug, Clone)]
pub struct ControlLogEntry {
    /// Row identifier.
    pub id: Uuid,
    /// Shocker the command targeted.
    pub shocker_id: Uuid,
    /// User who issued the command.
    pub controlled_by: Uuid,
    /// Intensity after clamping, 1-100.
    pub intensity: u8,
    /// Duration after clamping, milliseconds.
    pub duration_ms: u32,
    /// Command kind.
    pub control_type: ControlType,
    /// Server-side timestamp of acceptance.
    pub created_at: SystemTime,
}

/// A live gateway-server registration read from the shared registry.
///
/// Written by each gateway process on startup and refreshed by heartbeat;
/// entries expire with the registry TTL when the owning process stops
/// heartbeating. This side only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LcgNode {
    /// Fully-qualified domain name clients connect to; registry identity.
    pub fqdn: String,
    /// Country the gateway is hosted in.
    #[schema(value_type = String)]
    pub country: Alpha2CountryCode,
    /// Current load on a bounded 0-255 scale.
    pub load: u8,
    /// Deployment environment tag the node serves.
    pub environment: String,
}
