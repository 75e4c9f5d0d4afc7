/// Coalesced last-used timestamp writes.
pub mod batch_update;
/// Pub/sub channel carrying control messages between processes.
pub mod control_channel;
/// Grant resolution, clamping and dispatch of control commands.
pub mod control_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Hub WebSocket lifecycle and local delivery.
pub mod hub_gateway;
/// Geo-aware gateway node selection.
pub mod provisioner;
/// Redis connection supervision and degraded-mode management.
pub mod redis_supervisor;
