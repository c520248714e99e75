//! Input prompt state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prompt text used when the remote end does not provide one.
pub const DEFAULT_PROMPT: &str = "Input required:";

/// Whether the remote script is waiting for user input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "prompt", rename_all = "snake_case")]
pub enum InputPromptState {
    #[default]
    NoPrompt,
    AwaitingInput(String),
}

/// How to treat input submitted while no prompt is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
    /// Send it anyway. Gating is left to the UI.
    #[default]
    Permissive,
    /// Refuse with [`PromptError::NoPendingPrompt`].
    RequirePrompt,
}

/// Input refused by the prompt controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    /// Input sent under [`InputPolicy::RequirePrompt`] with no prompt pending.
    #[error("no input prompt is pending")]
    NoPendingPrompt,
}

/// Tracks the prompt cycle of the active execution.
///
/// Transitions come only from the remote end (`input_required` /
/// `input_received`). Submitting input does not clear the prompt.
#[derive(Debug, Clone, Default)]
pub struct InputPromptController {
    state: InputPromptState,
    policy: InputPolicy,
}

impl InputPromptController {
    #[must_use]
    pub fn new(policy: InputPolicy) -> Self {
        Self {
            state: InputPromptState::NoPrompt,
            policy,
        }
    }

    /// Remote end asked for input. Later prompts replace earlier ones.
    ///
    /// Missing or empty prompt text falls back to [`DEFAULT_PROMPT`].
    pub fn input_required(&mut self, prompt: Option<&str>) {
        let text = prompt
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROMPT);
        self.state = InputPromptState::AwaitingInput(text.to_string());
    }

    /// Remote end acknowledged the input.
    pub fn input_received(&mut self) {
        self.state = InputPromptState::NoPrompt;
    }

    /// Back to `NoPrompt`, used when a new session starts.
    pub fn reset(&mut self) {
        self.state = InputPromptState::NoPrompt;
    }

    /// Check that input may be sent under the configured policy.
    ///
    /// # Errors
    /// Returns [`PromptError::NoPendingPrompt`] under [`InputPolicy::RequirePrompt`]
    /// when nothing is pending.
    pub fn check_submission(&self) -> Result<(), PromptError> {
        match (self.policy, &self.state) {
            (InputPolicy::RequirePrompt, InputPromptState::NoPrompt) => {
                Err(PromptError::NoPendingPrompt)
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &InputPromptState {
        &self.state
    }

    /// Pending prompt text, if any.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        match &self.state {
            InputPromptState::AwaitingInput(text) => Some(text),
            InputPromptState::NoPrompt => None,
        }
    }

    #[must_use]
    pub const fn is_awaiting(&self) -> bool {
        matches!(self.state, InputPromptState::AwaitingInput(_))
    }

    #[must_use]
    pub const fn policy(&self) -> InputPolicy {
        self.policy
    }
}
