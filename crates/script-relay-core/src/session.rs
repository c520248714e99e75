//! Session identity for one remote execution.

use serde::{Deserialize, Serialize};

use crate::{envelope::now_timestamp, status::ConnectionState};

/// The client side of one remote execution.
///
/// `execution_id` and `role` never change after creation. A re-launch
/// creates a new `Session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    execution_id: String,
    role: String,
    /// Current state of the session's channel.
    pub connection_state: ConnectionState,
    /// Creation time, RFC 3339.
    pub started_at: String,
}

impl Session {
    /// Create a session that is about to connect.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            role: role.into(),
            connection_state: ConnectionState::Connecting,
            started_at: now_timestamp(),
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Whether a frame tagged with `execution_id` belongs to this session.
    #[must_use]
    pub fn owns(&self, execution_id: &str) -> bool {
        self.execution_id == execution_id
    }
}
