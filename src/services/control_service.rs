//! The control pipeline: resolve a user's requested commands against their
//! grants, clamp parameters to hard safety limits, persist the audit trail
//! and publish the fan-out message.
//!
//! The audit commit happens before the publish. A publish failure after a
//! successful commit surfaces to the caller while the audit rows stay
//! durable, so delivery is at most once and the trail never understates what
//! was accepted.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::models::{ControlLogEntry, ShockerGrant},
    dto::control::{
        ControlCommandInput, ControlOutcome, DeniedCommand, DenialReason, DispatchedCommand,
    },
    error::ServiceError,
    services::control_channel::{ControlMessage, ShockerControlInfo},
    state::SharedState,
};

/// Hard lower bound on intensity; zero would be a no-op on the hardware.
pub const INTENSITY_MIN: u8 = 1;
/// Hard upper bound on intensity.
pub const INTENSITY_MAX: u8 = 100;
/// Hard lower bound on duration; shorter pulses are not reproducible.
pub const DURATION_MIN_MS: u32 = 300;
/// Hard upper bound on duration.
pub const DURATION_MAX_MS: u32 = 30_000;

/// Outcome of grant resolution and clamping, before any I/O.
pub struct ResolvedControl {
    /// Accepted commands grouped by owning device, in request order.
    pub devices: IndexMap<Uuid, Vec<ShockerControlInfo>>,
    /// One audit row per accepted command.
    pub logs: Vec<ControlLogEntry>,
    /// Commands refused because no grant covers them.
    pub denied: Vec<DeniedCommand>,
}

/// Execute a batch of control commands for `user_id`.
///
/// Loads the user's owned and shared grants, resolves and clamps the
/// commands, commits the audit rows, then publishes one grouped message to
/// the control channel. Denied commands are reported in the outcome rather
/// than dropped silently.
pub async fn control(
    state: &SharedState,
    user_id: Uuid,
    commands: Vec<ControlCommandInput>,
) -> Result<ControlOutcome, ServiceError> {
    let store = state.require_control_store().await?;
    let publisher = state.require_publisher().await?;

    let owned = store.owned_grants(user_id).await?;
    let shared = store.shared_grants(user_id).await?;
    let grants = merge_grants(owned, shared);

    let resolved = resolve_commands(&grants, commands, user_id, SystemTime::now());

    let dispatched: IndexMap<Uuid, Vec<DispatchedCommand>> = resolved
        .devices
        .iter()
        .map(|(device_id, infos)| {
            (*device_id, infos.iter().map(DispatchedCommand::from).collect())
        })
        .collect();

    if resolved.devices.is_empty() {
        return Ok(ControlOutcome {
            message_id: None,
            devices: dispatched,
            denied: resolved.denied,
        });
    }

    store.append_control_logs(resolved.logs).await?;

    let message = ControlMessage {
        message_id: Uuid::new_v4(),
        sender: user_id,
        devices: resolved.devices,
    };
    let message_id = message.message_id;
    publisher.publish(message).await?;

    Ok(ControlOutcome {
        message_id: Some(message_id),
        devices: dispatched,
        denied: resolved.denied,
    })
}

/// Merge owned and shared grants into one lookup keyed by shocker id.
/// Ownership wins when a shocker appears in both sets.
pub fn merge_grants(
    owned: Vec<ShockerGrant>,
    shared: Vec<ShockerGrant>,
) -> HashMap<Uuid, ShockerGrant> {
    let mut grants = HashMap::with_capacity(owned.len() + shared.len());
    for grant in owned.into_iter().chain(shared) {
        grants.entry(grant.shocker_id).or_insert(grant);
    }
    grants
}

/// Resolve requested commands against the grant lookup: de-duplicate by
/// shocker id (first occurrence wins), clamp parameters, group accepted
/// commands by owning device and prepare their audit rows.
pub fn resolve_commands(
    grants: &HashMap<Uuid, ShockerGrant>,
    commands: Vec<ControlCommandInput>,
    user_id: Uuid,
    now: SystemTime,
) -> ResolvedControl {
    let mut seen = HashSet::with_capacity(commands.len());
    let mut devices: IndexMap<Uuid, Vec<ShockerControlInfo>> = IndexMap::new();
    let mut logs = Vec::new();
    let mut denied = Vec::new();

    for command in commands {
        if !seen.insert(command.id) {
            continue;
        }

        let Some(grant) = grants.get(&command.id) else {
            denied.push(DeniedCommand {
                id: command.id,
                reason: DenialReason::NotGranted,
            });
            continue;
        };

        let intensity = command.intensity.clamp(INTENSITY_MIN, INTENSITY_MAX);
        let duration_ms = command.duration_ms.clamp(DURATION_MIN_MS, DURATION_MAX_MS);

        devices
            .entry(grant.device_id)
            .or_default()
            .push(ShockerControlInfo {
                id: grant.shocker_id,
                rf_id: grant.rf_id,
                intensity,
                duration_ms,
                control_type: command.control_type,
                model: grant.model,
            });

        logs.push(ControlLogEntry {
            id: Uuid::new_v4(),
            shocker_id: grant.shocker_id,
            controlled_by: user_id,
            intensity,
            duration_ms,
            control_type: command.control_type,
            created_at: now,
        });
    }

    ResolvedControl {
        devices,
        logs,
        denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            control_store::MemoryControlStore,
            models::{ControlType, ShockerModel},
        },
        services::control_channel::{ControlPublisher, MemoryControlPublisher, PublishError},
        state::AppState,
    };
    use futures::future::BoxFuture;
    use std::sync::Arc;

    /// Publisher whose channel is permanently down.
    struct FailingPublisher;

    impl ControlPublisher for FailingPublisher {
        fn publish(
            &self,
            _message: ControlMessage,
        ) -> BoxFuture<'static, Result<(), PublishError>> {
            Box::pin(async {
                Err(PublishError::Unavailable {
                    message: "publishing to `device-control`".into(),
                    source: "connection reset".into(),
                })
            })
        }
    }

    fn grant(shocker_id: Uuid, device_id: Uuid, rf_id: u16) -> ShockerGrant {
        ShockerGrant {
            shocker_id,
            rf_id,
            device_id,
            model: ShockerModel::Petrainer,
        }
    }

    fn command(id: Uuid, control_type: ControlType, intensity: u8, duration_ms: u32) -> ControlCommandInput {
        ControlCommandInput {
            id,
            control_type,
            intensity,
            duration_ms,
        }
    }

    fn lookup(grants: Vec<ShockerGrant>) -> HashMap<Uuid, ShockerGrant> {
        grants
            .into_iter()
            .map(|grant| (grant.shocker_id, grant))
            .collect()
    }

    #[test]
    fn intensity_is_clamped_both_ways() {
        let shocker = Uuid::new_v4();
        let device = Uuid::new_v4();
        let grants = lookup(vec![grant(shocker, device, 1)]);

        let resolved = resolve_commands(
            &grants,
            vec![command(shocker, ControlType::Shock, 150, 1_000)],
            Uuid::new_v4(),
            SystemTime::now(),
        );
        assert_eq!(resolved.devices[&device][0].intensity, 100);

        let resolved = resolve_commands(
            &grants,
            vec![command(shocker, ControlType::Shock, 0, 1_000)],
            Uuid::new_v4(),
            SystemTime::now(),
        );
        assert_eq!(resolved.devices[&device][0].intensity, 1);
    }

    #[test]
    fn duration_is_clamped_both_ways() {
        let shocker = Uuid::new_v4();
        let device = Uuid::new_v4();
        let grants = lookup(vec![grant(shocker, device, 1)]);

        let resolved = resolve_commands(
            &grants,
            vec![command(shocker, ControlType::Vibrate, 50, 100)],
            Uuid::new_v4(),
            SystemTime::now(),
        );
        assert_eq!(resolved.devices[&device][0].duration_ms, 300);

        let resolved = resolve_commands(
            &grants,
            vec![command(shocker, ControlType::Vibrate, 50, 999_999)],
            Uuid::new_v4(),
            SystemTime::now(),
        );
        assert_eq!(resolved.devices[&device][0].duration_ms, 30_000);
    }

    #[test]
    fn duplicate_shocker_ids_keep_the_first_entry() {
        let shocker = Uuid::new_v4();
        let device = Uuid::new_v4();
        let grants = lookup(vec![grant(shocker, device, 1)]);

        let resolved = resolve_commands(
            &grants,
            vec![
                command(shocker, ControlType::Shock, 40, 1_000),
                command(shocker, ControlType::Vibrate, 80, 2_000),
            ],
            Uuid::new_v4(),
            SystemTime::now(),
        );

        let infos = &resolved.devices[&device];
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].control_type, ControlType::Shock);
        assert_eq!(infos[0].intensity, 40);
        assert_eq!(resolved.logs.len(), 1);
    }

    #[test]
    fn ungranted_commands_are_denied_without_audit_rows() {
        let grants = lookup(vec![]);
        let stranger = Uuid::new_v4();

        let resolved = resolve_commands(
            &grants,
            vec![command(stranger, ControlType::Sound, 50, 500)],
            Uuid::new_v4(),
            SystemTime::now(),
        );

        assert!(resolved.devices.is_empty());
        assert!(resolved.logs.is_empty());
        assert_eq!(
            resolved.denied,
            vec![DeniedCommand {
                id: stranger,
                reason: DenialReason::NotGranted,
            }]
        );
    }

    #[test]
    fn ownership_wins_over_share_for_the_same_shocker() {
        let shocker = Uuid::new_v4();
        let owned_device = Uuid::new_v4();
        let shared_device = Uuid::new_v4();

        let grants = merge_grants(
            vec![grant(shocker, owned_device, 7)],
            vec![grant(shocker, shared_device, 8)],
        );

        assert_eq!(grants[&shocker].device_id, owned_device);
    }

    #[tokio::test]
    async fn control_groups_commands_audits_and_publishes() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let store = MemoryControlStore::new();
        let publisher = MemoryControlPublisher::new();
        state.install_control_store(Arc::new(store.clone())).await;
        state.install_publisher(Arc::new(publisher.clone())).await;

        let user = Uuid::new_v4();
        let owned_shocker = Uuid::new_v4();
        let owned_device = Uuid::new_v4();
        let shared_shocker = Uuid::new_v4();
        let shared_device = Uuid::new_v4();
        store.insert_owned(user, grant(owned_shocker, owned_device, 11));
        store.insert_shared(user, grant(shared_shocker, shared_device, 22));

        let outcome = control(
            &state,
            user,
            vec![
                command(owned_shocker, ControlType::Shock, 200, 100),
                command(shared_shocker, ControlType::Sound, 50, 500),
            ],
        )
        .await
        .unwrap();

        assert!(outcome.message_id.is_some());
        assert!(outcome.denied.is_empty());
        assert_eq!(outcome.devices.len(), 2);
        assert_eq!(
            outcome.devices[&owned_device],
            vec![DispatchedCommand {
                id: owned_shocker,
                control_type: ControlType::Shock,
                intensity: 100,
                duration_ms: 300,
            }]
        );
        assert_eq!(
            outcome.devices[&shared_device],
            vec![DispatchedCommand {
                id: shared_shocker,
                control_type: ControlType::Sound,
                intensity: 50,
                duration_ms: 500,
            }]
        );

        let logs = store.logs();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|entry| entry.controlled_by == user));

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, user);
        assert_eq!(messages[0].message_id, outcome.message_id.unwrap());
        assert_eq!(messages[0].devices.len(), 2);
        assert_eq!(messages[0].devices[&owned_device][0].rf_id, 11);
    }

    #[tokio::test]
    async fn fully_denied_request_publishes_nothing() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let store = MemoryControlStore::new();
        let publisher = MemoryControlPublisher::new();
        state.install_control_store(Arc::new(store.clone())).await;
        state.install_publisher(Arc::new(publisher.clone())).await;

        let outcome = control(
            &state,
            Uuid::new_v4(),
            vec![command(Uuid::new_v4(), ControlType::Shock, 50, 1_000)],
        )
        .await
        .unwrap();

        assert!(outcome.message_id.is_none());
        assert_eq!(outcome.denied.len(), 1);
        assert!(store.logs().is_empty());
        assert!(publisher.messages().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_surfaces_but_audit_rows_stay_durable() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        let store = MemoryControlStore::new();
        state.install_control_store(Arc::new(store.clone())).await;
        state.install_publisher(Arc::new(FailingPublisher)).await;

        let user = Uuid::new_v4();
        let shocker = Uuid::new_v4();
        store.insert_owned(user, grant(shocker, Uuid::new_v4(), 5));

        let result = control(
            &state,
            user,
            vec![command(shocker, ControlType::Vibrate, 60, 1_000)],
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Dispatch(_))));
        // The audit trail committed before the publish was attempted.
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].shocker_id, shocker);
    }

    #[tokio::test]
    async fn missing_publisher_reports_degraded_mode() {
        let (state, _batch_rx) = AppState::new(AppConfig::default());
        state
            .install_control_store(Arc::new(MemoryControlStore::new()))
            .await;

        let result = control(
            &state,
            Uuid::new_v4(),
            vec![command(Uuid::new_v4(), ControlType::Stop, 1, 300)],
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Degraded)));
    }
}
