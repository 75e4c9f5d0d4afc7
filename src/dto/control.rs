use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::ControlType, services::control_channel::ShockerControlInfo};

/// Batch of control commands submitted by a user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ControlRequest {
    /// Commands to execute. Duplicate shocker ids keep the first entry.
    #[validate(length(min = 1, message = "at least one command is required"))]
    pub commands: Vec<ControlCommandInput>,
}

/// A single requested command. Out-of-range intensity and duration are
/// clamped server-side, never rejected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ControlCommandInput {
    /// Target shocker id.
    pub id: Uuid,
    /// Command kind.
    #[serde(rename = "type")]
    pub control_type: ControlType,
    /// Requested intensity; clamped to 1-100.
    pub intensity: u8,
    /// Requested duration in milliseconds; clamped to 300-30000.
    pub duration_ms: u32,
}

/// Result of a control request: what was dispatched and what was denied.
#[derive(Debug, Serialize, ToSchema)]
pub struct ControlOutcome {
    /// Id of the published fan-out message; absent when nothing was
    /// dispatched.
    pub message_id: Option<Uuid>,
    /// Accepted commands grouped by owning device, with clamped values.
    #[schema(value_type = Object)]
    pub devices: IndexMap<Uuid, Vec<DispatchedCommand>>,
    /// Commands that were not executed, with the reason.
    pub denied: Vec<DeniedCommand>,
}

/// An accepted command as it was dispatched, after clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchedCommand {
    /// Target shocker id.
    pub id: Uuid,
    /// Command kind.
    #[serde(rename = "type")]
    pub control_type: ControlType,
    /// Clamped intensity.
    pub intensity: u8,
    /// Clamped duration in milliseconds.
    pub duration_ms: u32,
}

impl From<&ShockerControlInfo> for DispatchedCommand {
    fn from(info: &ShockerControlInfo) -> Self {
        Self {
            id: info.id,
            control_type: info.control_type,
            intensity: info.intensity,
            duration_ms: info.duration_ms,
        }
    }
}

/// A command that was refused, paired with why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeniedCommand {
    /// Shocker id the command referenced.
    pub id: Uuid,
    /// Why the command was refused.
    pub reason: DenialReason,
}

/// Reasons a command can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The user neither owns the shocker nor holds a share on it.
    NotGranted,
}
