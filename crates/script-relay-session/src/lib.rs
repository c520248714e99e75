//! Client-side session protocol for remote script runs.
//!
//! Provides:
//! - `SessionManager` - Owns the active session and processes channel signals
//! - `SessionConnection` - Duplex channel lifecycle
//! - Message routing by execution id
//! - Job submitters (recording, HTTP)

pub mod config;
pub mod connection;
pub mod launcher;
pub mod manager;
pub mod router;
pub mod submit;

pub use config::SessionConfig;
pub use connection::SessionConnection;
pub use launcher::JobDescriptor;
pub use manager::{FrameDisposition, SessionError, SessionEvent, SessionManager, SessionSnapshot};
pub use router::RouteOutcome;
