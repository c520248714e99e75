//! Session configuration.

use std::time::Duration;

use script_relay_core::{
    InputPolicy,
    envelope::ROLE_FRONTEND,
    traits::{DEFAULT_CLIENT_ID, DEFAULT_OUTPUT_DESTINATION},
};

/// Settings shared by every session a manager launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the duplex channel.
    pub websocket_url: String,
    /// Role announced on the channel.
    pub role: String,
    /// Client id passed to the job runner.
    pub client_id: String,
    /// Where the job runner should send output.
    pub output_destination: String,
    /// Treatment of input sent while no prompt is pending.
    pub input_policy: InputPolicy,
    /// Treat this much silence on an open channel as a channel error.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Create a config with defaults for everything but the channel URL.
    pub fn new(websocket_url: impl Into<String>) -> Self {
        Self {
            websocket_url: websocket_url.into(),
            role: ROLE_FRONTEND.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            output_destination: DEFAULT_OUTPUT_DESTINATION.to_string(),
            input_policy: InputPolicy::default(),
            idle_timeout: None,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    #[must_use]
    pub fn with_output_destination(mut self, destination: impl Into<String>) -> Self {
        self.output_destination = destination.into();
        self
    }

    #[must_use]
    pub const fn with_input_policy(mut self, policy: InputPolicy) -> Self {
        self.input_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }
}
