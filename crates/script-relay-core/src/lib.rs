//! Core building blocks for streaming a remote script execution.
//!
//! This crate provides:
//! - `envelope` - Wire codec, including relayed-frame normalization
//! - `OutputBuffer` - Ordered stdout/stderr lines
//! - `InputPromptController` - Input prompt state machine
//! - `HistoryLog` - Record of every received frame
//! - `Connector` and `JobSubmitter` traits for the external collaborators

pub mod channel;
pub mod envelope;
pub mod history;
pub mod output;
pub mod prompt;
pub mod session;
pub mod status;
pub mod traits;
pub mod updates;

pub use channel::{ChannelError, Connector, Duplex, TransportSignal, channel_url};
pub use envelope::{DecodeError, DecodedFrame, EncodeError, Encoded, Envelope};
pub use history::{HistoryEntry, HistoryLog};
pub use output::{OutputBuffer, Stream};
pub use prompt::{InputPolicy, InputPromptController, InputPromptState, PromptError};
pub use session::Session;
pub use status::{ConnectionState, Status, StatusKind};
pub use traits::{JobRequest, JobResponse, JobSubmitter, OutputConfig, SubmitError};
pub use updates::{SessionUpdate, UpdateBus};
