//! In-memory job submitter.

use std::sync::RwLock;

use async_trait::async_trait;
use script_relay_core::{JobRequest, JobResponse, JobSubmitter, SubmitError};

/// How a [`RecordingSubmitter`] answers.
#[derive(Debug, Clone)]
enum Reply {
    Accept,
    Reject(String),
    Fail(String),
}

/// Submitter that records requests instead of dispatching them.
///
/// Useful for development, tests and dry runs. Nothing is executed.
pub struct RecordingSubmitter {
    requests: RwLock<Vec<JobRequest>>,
    reply: RwLock<Reply>,
}

impl RecordingSubmitter {
    /// Accept every request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(Vec::new()),
            reply: RwLock::new(Reply::Accept),
        }
    }

    /// Answer every request with `success: false` and `error`.
    #[must_use]
    pub fn rejecting(error: impl Into<String>) -> Self {
        let submitter = Self::new();
        submitter.set_reply(Reply::Reject(error.into()));
        submitter
    }

    /// Fail every request with a transport error.
    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        let submitter = Self::new();
        submitter.set_reply(Reply::Fail(error.into()));
        submitter
    }

    /// Go back to accepting requests.
    pub fn accept(&self) {
        self.set_reply(Reply::Accept);
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn set_reply(&self, reply: Reply) {
        if let Ok(mut slot) = self.reply.write() {
            *slot = reply;
        }
    }
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobSubmitter for RecordingSubmitter {
    async fn submit(&self, request: &JobRequest) -> Result<JobResponse, SubmitError> {
        self.requests
            .write()
            .map_err(|e| SubmitError::Transport(e.to_string()))?
            .push(request.clone());

        let reply = self
            .reply
            .read()
            .map_err(|e| SubmitError::Transport(e.to_string()))?
            .clone();

        match reply {
            Reply::Accept => Ok(JobResponse::accepted(format!(
                "Script execution started with ID: {}",
                request.execution_id
            ))),
            Reply::Reject(error) => Ok(JobResponse::rejected(error)),
            Reply::Fail(error) => Err(SubmitError::Transport(error)),
        }
    }
}
