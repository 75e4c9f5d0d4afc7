//! Request and response payloads for the HTTP and WebSocket surfaces.

pub mod control;
pub mod health;
pub mod node;
pub mod ws;
