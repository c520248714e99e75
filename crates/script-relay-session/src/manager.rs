//! Session manager: single owner of the active session's state.

use std::sync::Arc;

use script_relay_core::{
    ChannelError, ConnectionState, Connector, EncodeError, Envelope, HistoryEntry, HistoryLog,
    InputPromptController, JobSubmitter, OutputBuffer, PromptError, Session, SessionUpdate,
    Status, TransportSignal, UpdateBus, envelope,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{sync::broadcast, time::Instant};

use crate::{
    config::SessionConfig,
    connection::SessionConnection,
    router::{self, RouteOutcome, RouteTargets},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No session has been started")]
    NotInitialized,
    #[error("Channel is not open")]
    NotConnected,
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("Failed to start script: {0}")]
    Submission(String),
}

/// What handling one transport signal did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Closed { reason: Option<String> },
    Errored(String),
    Frame(FrameDisposition),
}

/// Fate of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Decoded and handed to the router.
    Routed(RouteOutcome),
    /// Recorded in history, not routed.
    Undecodable(String),
    /// Empty frame, recorded in history only.
    Empty,
    /// Arrived while the channel was not open. Not recorded.
    Rejected,
}

/// Point-in-time view of the session for UI layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_connected: bool,
    pub connection_state: ConnectionState,
    pub execution_id: Option<String>,
    pub status: Status,
    pub output: OutputBuffer,
    pub input_prompt: Option<String>,
    pub message_history: Vec<HistoryEntry>,
}

/// Owns the channel, output, prompt, history and status of the active
/// session.
///
/// All mutation goes through `&mut self`; transport signals are handled one
/// at a time in arrival order via [`SessionManager::recv`].
pub struct SessionManager {
    pub(crate) config: SessionConfig,
    pub(crate) connection: SessionConnection,
    pub(crate) submitter: Arc<dyn JobSubmitter>,
    pub(crate) output: OutputBuffer,
    pub(crate) prompt: InputPromptController,
    pub(crate) history: HistoryLog,
    pub(crate) status: Status,
    pub(crate) updates: UpdateBus,
    /// When the open channel counts as idle. Moves on every handled signal.
    idle_deadline: Option<Instant>,
}

impl SessionManager {
    /// Create a new session manager.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        submitter: Arc<dyn JobSubmitter>,
    ) -> Self {
        let prompt = InputPromptController::new(config.input_policy);
        Self {
            config,
            connection: SessionConnection::new(connector),
            submitter,
            output: OutputBuffer::new(),
            prompt,
            history: HistoryLog::new(),
            status: Status::default(),
            updates: UpdateBus::new(),
            idle_deadline: None,
        }
    }

    /// Open a channel for `execution_id`, closing any previous one.
    ///
    /// Output and history are left as they are; [`Self::start_session`]
    /// resets them.
    ///
    /// # Errors
    /// Returns error if the channel cannot be opened. The status shows the
    /// failure.
    pub async fn connect(&mut self, execution_id: &str) -> Result<(), SessionError> {
        let base_url = self.config.websocket_url.clone();
        let role = self.config.role.clone();

        let result = self
            .connection
            .connect(&base_url, execution_id, &role)
            .await;
        self.publish_connection();
        self.touch();

        if let Err(e) = result {
            self.set_status(Status::error(format!("Connection error: {e}")));
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the channel immediately.
    pub fn disconnect(&mut self) {
        if self.connection.disconnect() {
            self.set_status(Status::warning("Disconnected from WebSocket server"));
        }
        self.publish_connection();
    }

    /// Wait for the next transport signal and handle it.
    ///
    /// Returns `None` when there is no live channel. With an idle timeout
    /// configured, silence longer than the timeout is handled as a channel
    /// error. The idle clock runs from the last handled signal, so dropping
    /// this future (e.g. in a `select!`) does not restart it.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let signal = match self.config.idle_timeout {
            Some(limit) => {
                let deadline = *self
                    .idle_deadline
                    .get_or_insert_with(|| Instant::now() + limit);
                match tokio::time::timeout_at(deadline, self.connection.recv()).await {
                    Ok(signal) => signal?,
                    Err(_) => {
                        TransportSignal::Error(format!("no frames received for {limit:?}"))
                    }
                }
            }
            None => self.connection.recv().await?,
        };
        Some(self.handle_signal(signal))
    }

    /// Handle one transport signal.
    pub fn handle_signal(&mut self, signal: TransportSignal) -> SessionEvent {
        self.touch();
        match signal {
            TransportSignal::Opened => {
                self.connection.on_open();
                tracing::info!(
                    execution_id = ?self.connection.execution_id(),
                    "WebSocket connection established"
                );
                self.set_status(Status::success("Connected to WebSocket server"));
                self.publish_connection();
                SessionEvent::Opened
            }
            TransportSignal::Frame(raw) => SessionEvent::Frame(self.handle_frame(raw)),
            TransportSignal::Closed { reason } => {
                self.connection.on_close();
                tracing::info!(?reason, "WebSocket connection closed");
                self.set_status(Status::warning("Disconnected from WebSocket server"));
                self.publish_connection();
                SessionEvent::Closed { reason }
            }
            TransportSignal::Error(message) => {
                self.connection.on_error();
                tracing::error!("WebSocket error: {message}");
                self.set_status(Status::error(format!(
                    "WebSocket error occurred: {message}"
                )));
                self.publish_connection();
                SessionEvent::Errored(message)
            }
        }
    }

    fn handle_frame(&mut self, raw: String) -> FrameDisposition {
        if !self.connection.is_connected() {
            tracing::warn!(
                state = ?self.connection.state(),
                "Rejecting frame received on a channel that is not open"
            );
            return FrameDisposition::Rejected;
        }

        if raw.is_empty() {
            self.record(raw, None);
            return FrameDisposition::Empty;
        }

        let parsed = match envelope::parse(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Error processing WebSocket message: {e}");
                self.record(raw, None);
                return FrameDisposition::Undecodable(e.to_string());
            }
        };
        let effective = envelope::effective_envelope(&parsed);
        self.record(raw, Some(parsed));
        let envelope = match effective {
            Ok((envelope, _relayed)) => envelope,
            Err(e) => {
                tracing::warn!("Error processing WebSocket message: {e}");
                return FrameDisposition::Undecodable(e.to_string());
            }
        };

        let Some(active) = self.connection.execution_id() else {
            return FrameDisposition::Rejected;
        };
        let outcome = router::route(
            &envelope,
            active,
            RouteTargets {
                output: &mut self.output,
                prompt: &mut self.prompt,
                status: &mut self.status,
            },
        );
        self.publish_outcome(outcome);
        FrameDisposition::Routed(outcome)
    }

    /// Answer the pending prompt (or send unsolicited input, if the policy
    /// allows it).
    ///
    /// The prompt stays pending until the remote end confirms with
    /// `input_received`.
    ///
    /// # Errors
    /// Returns error if no session exists, the channel is not open, or the
    /// input policy refuses the submission.
    pub fn submit_input(&mut self, text: &str) -> Result<Envelope, SessionError> {
        let execution_id = self.active_execution_id()?.to_string();
        self.prompt.check_submission()?;

        let encoded = envelope::encode(Envelope::user_input(text), &execution_id)?;
        self.connection.send(encoded.text)?;
        tracing::info!(%execution_id, "Sent input");
        Ok(encoded.envelope)
    }

    /// Send an arbitrary JSON object, stamped with the execution id and a
    /// timestamp.
    ///
    /// # Errors
    /// Returns error if no session exists or the channel is not open.
    pub fn send_message(&mut self, payload: Map<String, Value>) -> Result<(), SessionError> {
        let execution_id = self.active_execution_id()?.to_string();
        let text = envelope::encode_payload(payload, &execution_id)?;
        self.connection.send(text)?;
        Ok(())
    }

    /// Drop all output lines of the current session.
    pub fn clear_output(&mut self) {
        self.output.clear();
        self.updates.publish(SessionUpdate::OutputCleared);
    }

    /// Drop all recorded frames.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.updates.publish(SessionUpdate::HistoryCleared);
    }

    /// Whether the channel is `Open`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// State of the current channel, `Disconnected` if there is none.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The active session, if one was started.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.connection.session()
    }

    /// Execution id of the active session.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        self.connection.execution_id()
    }

    /// Current status line.
    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// Output of the active session.
    #[must_use]
    pub const fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Pending prompt text, if the remote end is waiting for input.
    #[must_use]
    pub fn input_prompt(&self) -> Option<&str> {
        self.prompt.prompt()
    }

    /// Every frame received since the last clear.
    #[must_use]
    pub const fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Settings this manager was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the session state for UI layers.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_connected: self.is_connected(),
            connection_state: self.connection_state(),
            execution_id: self.execution_id().map(ToOwned::to_owned),
            status: self.status.clone(),
            output: self.output.clone(),
            input_prompt: self.input_prompt().map(ToOwned::to_owned),
            message_history: self.history.entries().to_vec(),
        }
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Update bus, for streams of live updates.
    #[must_use]
    pub fn updates(&self) -> &UpdateBus {
        &self.updates
    }

    fn active_execution_id(&self) -> Result<&str, SessionError> {
        let execution_id = self
            .connection
            .execution_id()
            .ok_or(SessionError::NotInitialized)?;
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        Ok(execution_id)
    }

    fn touch(&mut self) {
        self.idle_deadline = self.config.idle_timeout.map(|limit| Instant::now() + limit);
    }

    fn record(&mut self, raw: String, parsed: Option<Value>) {
        let entry = self.history.record(raw, parsed);
        if self.updates.observer_count() > 0 {
            self.updates.publish(SessionUpdate::History {
                entry: entry.clone(),
            });
        }
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status.clone();
        self.updates.publish(SessionUpdate::Status { status });
    }

    fn publish_connection(&self) {
        self.updates.publish(SessionUpdate::Connection {
            state: self.connection.state(),
        });
    }

    fn publish_outcome(&self, outcome: RouteOutcome) {
        let update = match outcome {
            RouteOutcome::Output(stream) => {
                let Some(line) = self.output.lines(stream).last() else {
                    return;
                };
                SessionUpdate::Output {
                    stream,
                    line: line.clone(),
                }
            }
            RouteOutcome::PromptRequested | RouteOutcome::PromptCleared => {
                SessionUpdate::Prompt {
                    prompt: self.prompt.prompt().map(ToOwned::to_owned),
                }
            }
            RouteOutcome::Status => SessionUpdate::Status {
                status: self.status.clone(),
            },
            RouteOutcome::ExecutionMismatch | RouteOutcome::Ignored => return,
        };
        self.updates.publish(update);
    }

    /// Clear per-session state ahead of a new session.
    pub(crate) fn reset_for_new_session(&mut self) {
        self.clear_output();
        self.clear_history();
        if self.prompt.is_awaiting() {
            self.prompt.reset();
            self.updates.publish(SessionUpdate::Prompt { prompt: None });
        }
    }
}
