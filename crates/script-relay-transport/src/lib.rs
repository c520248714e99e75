//! Duplex channel transports.
//!
//! Provides:
//! - WebSocket connector (feature: websocket)
//! - Loopback connector for tests and offline runs

pub mod loopback;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use loopback::{LoopbackConnector, RemoteEnd, SendError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WsConnectorOptions};
