//! Broadcast of session changes to UI observers.

use futures::{StreamExt, future};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    history::HistoryEntry,
    output::Stream,
    status::{ConnectionState, Status},
};

/// Capacity of the live update channel. Slow observers skip ahead.
const UPDATE_CAPACITY: usize = 1024;

/// One observable change of session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A new session replaced the previous one.
    SessionStarted { execution_id: String },
    Connection { state: ConnectionState },
    Status { status: Status },
    Output { stream: Stream, line: String },
    /// Prompt appeared (`Some`) or was answered (`None`).
    Prompt { prompt: Option<String> },
    History { entry: HistoryEntry },
    OutputCleared,
    HistoryCleared,
}

/// Fan-out of [`SessionUpdate`]s.
///
/// Publishing never blocks and never fails; with no observers the update is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    sender: broadcast::Sender<SessionUpdate>,
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(UPDATE_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, update: SessionUpdate) {
        let _ = self.sender.send(update);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.sender.subscribe()
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of live updates. Lagged updates are skipped.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, SessionUpdate> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| future::ready(res.ok()))
            .boxed()
    }

    /// Stream of output lines for one stream.
    #[must_use]
    pub fn output_stream(&self, wanted: Stream) -> futures::stream::BoxStream<'static, String> {
        self.stream()
            .filter_map(move |update| {
                future::ready(match update {
                    SessionUpdate::Output { stream, line } if stream == wanted => Some(line),
                    _ => None,
                })
            })
            .boxed()
    }
}
