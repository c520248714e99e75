//! Connection state and the user-facing status line.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the duplex channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel, or explicitly disconnected.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Channel is open and frames are accepted.
    Open,
    /// Remote end closed the channel.
    Closed,
    /// Transport failed. Never retried automatically.
    Errored,
}

impl ConnectionState {
    /// Whether frames may flow in either direction.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the channel has ended, for whatever reason.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed | Self::Errored)
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Status line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub message: String,
}

impl Status {
    /// Create a status with an explicit kind.
    #[must_use]
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Info, message)
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Success, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Warning, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, message)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::info("Not connected")
    }
}
