//! Persistence and registry abstractions behind the control pipeline.

/// Grant, audit and last-used persistence operations.
pub mod control_store;
/// Entity definitions shared by stores and services.
pub mod models;
/// Gateway node registry backed by the shared TTL store.
pub mod node_registry;
/// Error types common to all storage backends.
pub mod storage;
