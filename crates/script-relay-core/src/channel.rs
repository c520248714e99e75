//! Duplex channel abstraction and URL contract.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Signal delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Handshake completed. Always the first signal of a channel.
    Opened,
    /// One application frame.
    Frame(String),
    /// Remote end closed the channel.
    Closed { reason: Option<String> },
    /// Transport failure. No further signals follow.
    Error(String),
}

/// Both halves of an open channel.
///
/// Dropping the value closes the channel: the transport stops delivering
/// signals once `incoming` is gone and closes the socket once `outgoing` is
/// gone.
#[derive(Debug)]
pub struct Duplex {
    /// Text frames to send to the remote end.
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Signals from the remote end.
    pub incoming: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Channel error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Channel closed")]
    Closed,
}

impl From<url::ParseError> for ChannelError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Opens duplex channels.
///
/// Implementations complete the handshake before returning and push
/// [`TransportSignal::Opened`] as the first incoming signal.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `url`.
    async fn open(&self, url: &Url) -> Result<Duplex, ChannelError>;
}

/// Build the channel URL for an execution.
///
/// Produces `<base>?execution_id=<id>&role=<role>`, keeping any query pairs
/// already present on `base`. `http`/`https` bases are rewritten to
/// `ws`/`wss`.
///
/// # Errors
/// Returns [`ChannelError::InvalidUrl`] if `base` does not parse or uses an
/// unsupported scheme.
pub fn channel_url(base: &str, execution_id: &str, role: &str) -> Result<Url, ChannelError> {
    let base = base.trim();
    let rewritten = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };

    let mut url = Url::parse(&rewritten)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    url.query_pairs_mut()
        .append_pair("execution_id", execution_id)
        .append_pair("role", role);
    Ok(url)
}
