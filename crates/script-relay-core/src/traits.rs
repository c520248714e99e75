//! Job submission contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default `output_destination` for streamed runs.
pub const DEFAULT_OUTPUT_DESTINATION: &str = "websocket";

/// Default client id reported to the job runner.
pub const DEFAULT_CLIENT_ID: &str = "frontend-client";

/// Where the remote job should stream its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub websocket_url: String,
    pub client_id: String,
}

/// Request to start a remote script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Storage key of the script to run.
    pub s3_key: String,
    pub output_destination: String,
    pub output_config: OutputConfig,
    pub execution_id: String,
}

impl JobRequest {
    /// Check the request before it is sent.
    ///
    /// # Errors
    /// Returns [`SubmitError::InvalidRequest`] if the script key is blank.
    pub fn validate(&self) -> Result<(), SubmitError> {
        if self.s3_key.trim().is_empty() {
            return Err(SubmitError::InvalidRequest(
                "Missing s3_key parameter".to_string(),
            ));
        }
        Ok(())
    }
}

/// Job runner reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResponse {
    #[must_use]
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Submission error.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),
    #[error("Submission transport error: {0}")]
    Transport(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Trait for the external job dispatch service.
///
/// The session layer only needs the request/response contract; how the job is
/// queued is up to the implementation.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Ask the job runner to start a script.
    async fn submit(&self, request: &JobRequest) -> Result<JobResponse, SubmitError>;
}
