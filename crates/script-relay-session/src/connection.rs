//! Lifecycle of the single duplex channel.

use std::sync::Arc;

use script_relay_core::{
    ChannelError, ConnectionState, Connector, Duplex, Session, TransportSignal, channel_url,
};

/// Owns at most one open channel and the session it belongs to.
///
/// Opening a new channel always drops the previous one first.
pub struct SessionConnection {
    connector: Arc<dyn Connector>,
    session: Option<Session>,
    duplex: Option<Duplex>,
}

impl SessionConnection {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            session: None,
            duplex: None,
        }
    }

    /// Open a channel for `execution_id`.
    ///
    /// The session moves to `Connecting`; it becomes `Open` once the
    /// transport's `Opened` signal is handled.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the handshake fails. The session
    /// is left in `Errored`.
    pub async fn connect(
        &mut self,
        base_url: &str,
        execution_id: &str,
        role: &str,
    ) -> Result<(), ChannelError> {
        self.disconnect();

        let session = self.session.insert(Session::new(execution_id, role));
        let url = match channel_url(base_url, execution_id, role) {
            Ok(url) => url,
            Err(e) => {
                session.connection_state = ConnectionState::Errored;
                return Err(e);
            }
        };

        tracing::info!(execution_id, "Connecting to {url}");
        match self.connector.open(&url).await {
            Ok(duplex) => {
                self.duplex = Some(duplex);
                Ok(())
            }
            Err(e) => {
                tracing::error!(execution_id, "Connection failed: {e}");
                self.set_state(ConnectionState::Errored);
                Err(e)
            }
        }
    }

    /// Drop the channel immediately.
    ///
    /// Returns true if a channel was open.
    pub fn disconnect(&mut self) -> bool {
        let had_channel = self.duplex.take().is_some();
        if had_channel {
            tracing::info!(execution_id = ?self.execution_id(), "Channel closed by client");
        }
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.connection_state != ConnectionState::Disconnected)
        {
            self.set_state(ConnectionState::Disconnected);
        }
        had_channel
    }

    /// Wait for the next transport signal.
    ///
    /// Returns `None` when no channel is held. A transport that vanishes
    /// without a final signal is reported as closed.
    pub async fn recv(&mut self) -> Option<TransportSignal> {
        let duplex = self.duplex.as_mut()?;
        Some(
            duplex
                .incoming
                .recv()
                .await
                .unwrap_or(TransportSignal::Closed { reason: None }),
        )
    }

    /// Handshake completed.
    pub fn on_open(&mut self) {
        if self.duplex.is_some() {
            self.set_state(ConnectionState::Open);
        }
    }

    /// Remote end closed the channel.
    pub fn on_close(&mut self) {
        self.duplex = None;
        self.set_state(ConnectionState::Closed);
    }

    /// Transport failed. The channel is released and not retried.
    pub fn on_error(&mut self) {
        self.duplex = None;
        self.set_state(ConnectionState::Errored);
    }

    /// Queue a text frame for the remote end.
    ///
    /// # Errors
    /// Returns [`ChannelError::Closed`] unless the channel is open.
    pub fn send(&self, text: String) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::Closed);
        }
        self.duplex
            .as_ref()
            .ok_or(ChannelError::Closed)?
            .outgoing
            .send(text)
            .map_err(|_| ChannelError::Closed)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.connection_state)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::execution_id)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if let Some(session) = self.session.as_mut() {
            tracing::debug!(
                execution_id = session.execution_id(),
                "Connection {:?} -> {:?}",
                session.connection_state,
                state
            );
            session.connection_state = state;
        }
    }
}
