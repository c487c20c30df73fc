//! WebSocket layer - wire protocol, broadcast hub, connection handling

pub mod handler;
pub mod hub;
pub mod protocol;

pub use hub::BroadcastHub;
