//! HTTP job submitter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use script_relay_core::{JobRequest, JobResponse, JobSubmitter, SubmitError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Posts job requests as JSON to a run-script endpoint.
#[derive(Debug, Clone)]
pub struct HttpJobSubmitter {
    client: Client,
    endpoint: String,
}

impl HttpJobSubmitter {
    /// Create a submitter with the default 30 second timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SubmitError> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a submitter with a custom request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl JobSubmitter for HttpJobSubmitter {
    async fn submit(&self, request: &JobRequest) -> Result<JobResponse, SubmitError> {
        request.validate()?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        match serde_json::from_str::<JobResponse>(&body) {
            Ok(parsed) if status.is_success() || !parsed.success => Ok(parsed),
            Ok(_) => Ok(JobResponse::rejected(format!("HTTP {status}"))),
            Err(_) if !status.is_success() => Ok(JobResponse::rejected(format!("HTTP {status}"))),
            Err(e) => Err(SubmitError::InvalidResponse(e.to_string())),
        }
    }
}
