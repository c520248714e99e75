//! Dispatch of decoded envelopes to session state.

use script_relay_core::{Envelope, InputPromptController, OutputBuffer, Status, Stream};
use serde_json::Value;

/// What a routed envelope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Envelope belongs to another execution. Nothing changed.
    ExecutionMismatch,
    /// One line appended to a stream.
    Output(Stream),
    /// Prompt set (or replaced).
    PromptRequested,
    /// Prompt cleared.
    PromptCleared,
    /// Status line replaced.
    Status,
    /// Unknown type or event, or missing payload. Nothing changed.
    Ignored,
}

impl RouteOutcome {
    /// Whether session state changed.
    #[must_use]
    pub const fn changed_state(self) -> bool {
        !matches!(self, Self::ExecutionMismatch | Self::Ignored)
    }
}

/// Session state the router may touch.
pub struct RouteTargets<'a> {
    pub output: &'a mut OutputBuffer,
    pub prompt: &'a mut InputPromptController,
    pub status: &'a mut Status,
}

/// Route one envelope for the active execution.
///
/// Applies at most one state change.
pub fn route(
    envelope: &Envelope,
    active_execution_id: &str,
    targets: RouteTargets<'_>,
) -> RouteOutcome {
    if envelope.execution_id != active_execution_id {
        tracing::debug!(
            execution_id = %envelope.execution_id,
            "Dropping frame for another execution"
        );
        return RouteOutcome::ExecutionMismatch;
    }

    match envelope.kind.as_str() {
        "output" => route_output(envelope, targets.output),
        "status" => match envelope.event.as_str() {
            "input_required" => {
                targets.prompt.input_required(envelope.data_str("prompt"));
                RouteOutcome::PromptRequested
            }
            "input_received" => {
                targets.prompt.input_received();
                RouteOutcome::PromptCleared
            }
            event => {
                *targets.status = Status::info(format!("{event}: {}", envelope.data));
                RouteOutcome::Status
            }
        },
        other => {
            tracing::debug!("Unknown message type: {other}");
            RouteOutcome::Ignored
        }
    }
}

fn route_output(envelope: &Envelope, output: &mut OutputBuffer) -> RouteOutcome {
    let Some(stream) = Stream::from_event(&envelope.event) else {
        tracing::debug!("Unknown output event: {}", envelope.event);
        return RouteOutcome::Ignored;
    };
    let Some(line) = line_text(envelope.data_field("line")) else {
        tracing::warn!("Output frame without a line");
        return RouteOutcome::Ignored;
    };
    output.append_line(stream, line);
    RouteOutcome::Output(stream)
}

fn line_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
