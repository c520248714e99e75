//! Launching a remote script run.

use script_relay_core::{JobRequest, OutputConfig, SessionUpdate, Status};
use uuid::Uuid;

use crate::manager::{SessionError, SessionManager};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Storage key of the script.
    pub script_key: String,
    /// Overrides the configured output destination.
    pub output_destination: Option<String>,
}

impl JobDescriptor {
    pub fn new(script_key: impl Into<String>) -> Self {
        Self {
            script_key: script_key.into(),
            output_destination: None,
        }
    }

    #[must_use]
    pub fn with_output_destination(mut self, destination: impl Into<String>) -> Self {
        self.output_destination = Some(destination.into());
        self
    }
}

impl SessionManager {
    /// Start a new remote run and return its execution id.
    ///
    /// The previous session is superseded: its channel is dropped and output,
    /// history and prompt are cleared before the new channel opens. The job
    /// is submitted only after the handshake completes, so the runner cannot
    /// emit output before the client listens. The channel reaches `Open` once
    /// the next [`Self::recv`] handles the queued `Opened` signal.
    ///
    /// # Errors
    /// Returns error if the channel cannot be opened or the job runner refuses
    /// the job. A refused job leaves the open channel untouched.
    pub async fn start_session(&mut self, job: &JobDescriptor) -> Result<String, SessionError> {
        let execution_id = Uuid::new_v4().to_string();
        tracing::info!(%execution_id, script = %job.script_key, "Starting session");

        self.disconnect();
        self.reset_for_new_session();
        self.updates.publish(SessionUpdate::SessionStarted {
            execution_id: execution_id.clone(),
        });

        self.connect(&execution_id).await?;

        let request = JobRequest {
            s3_key: job.script_key.clone(),
            output_destination: job
                .output_destination
                .clone()
                .unwrap_or_else(|| self.config.output_destination.clone()),
            output_config: OutputConfig {
                websocket_url: self.config.websocket_url.clone(),
                client_id: self.config.client_id.clone(),
            },
            execution_id: execution_id.clone(),
        };
        self.submit(&request).await?;

        Ok(execution_id)
    }

    async fn submit(&mut self, request: &JobRequest) -> Result<(), SessionError> {
        let outcome = match request.validate() {
            Ok(()) => self
                .submitter
                .submit(request)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let reason = match outcome {
            Ok(response) if response.success => {
                tracing::info!(
                    execution_id = %request.execution_id,
                    message = ?response.message,
                    "Script execution requested"
                );
                return Ok(());
            }
            Ok(response) => response
                .error
                .unwrap_or_else(|| "job runner refused the request".to_string()),
            Err(e) => e,
        };

        tracing::error!(execution_id = %request.execution_id, "Failed to start script: {reason}");
        self.set_status(Status::error(format!("Failed to start script: {reason}")));
        Err(SessionError::Submission(reason))
    }
}
