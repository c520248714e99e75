//! In-process transport for tests and offline runs.

use std::sync::Mutex;

use async_trait::async_trait;
use script_relay_core::{ChannelError, Connector, Duplex, TransportSignal};
use tokio::sync::mpsc;
use url::Url;

/// Connector whose channels end in a [`RemoteEnd`] held by the caller.
///
/// Every successful `open` hands the remote side of the new channel to the
/// receiver returned by [`LoopbackConnector::new`].
pub struct LoopbackConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    probes: Mutex<Vec<mpsc::UnboundedSender<TransportSignal>>>,
    refuse_next: Mutex<Option<String>>,
}

impl LoopbackConnector {
    /// Create a connector and the receiver of its remote ends.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, remote_rx) = mpsc::unbounded_channel();
        let connector = Self {
            remotes,
            probes: Mutex::new(Vec::new()),
            refuse_next: Mutex::new(None),
        };
        (connector, remote_rx)
    }

    /// Fail the next handshake with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.refuse_next.lock() {
            *slot = Some(reason.into());
        }
    }

    /// Number of channels whose client side is still alive.
    #[must_use]
    pub fn live_channels(&self) -> usize {
        self.probes
            .lock()
            .map(|probes| probes.iter().filter(|p| !p.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn open(&self, url: &Url) -> Result<Duplex, ChannelError> {
        let refused = self
            .refuse_next
            .lock()
            .map_err(|e| ChannelError::Handshake(e.to_string()))?
            .take();
        if let Some(reason) = refused {
            return Err(ChannelError::Handshake(reason));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let live_at_open = {
            let mut probes = self
                .probes
                .lock()
                .map_err(|e| ChannelError::Handshake(e.to_string()))?;
            probes.retain(|p| !p.is_closed());
            let live = probes.len();
            probes.push(incoming_tx.clone());
            live
        };

        let _ = incoming_tx.send(TransportSignal::Opened);

        let remote = RemoteEnd {
            url: url.clone(),
            incoming: incoming_tx,
            outgoing: outgoing_rx,
            live_at_open,
        };
        self.remotes
            .send(remote)
            .map_err(|_| ChannelError::Handshake("no listener for loopback channels".into()))?;

        Ok(Duplex {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

/// Remote side of a loopback channel.
pub struct RemoteEnd {
    url: Url,
    incoming: mpsc::UnboundedSender<TransportSignal>,
    outgoing: mpsc::UnboundedReceiver<String>,
    live_at_open: usize,
}

impl RemoteEnd {
    /// URL the client connected to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Value of a query parameter of the connection URL.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Channels that were still open on the client when this one opened.
    #[must_use]
    pub const fn live_at_open(&self) -> usize {
        self.live_at_open
    }

    /// Deliver a text frame to the client.
    ///
    /// # Errors
    /// Returns error if the client dropped the channel.
    pub fn send_frame(&self, frame: impl Into<String>) -> Result<(), SendError> {
        self.signal(TransportSignal::Frame(frame.into()))
    }

    /// Close the channel from the remote side.
    ///
    /// # Errors
    /// Returns error if the client dropped the channel.
    pub fn close(&self, reason: Option<&str>) -> Result<(), SendError> {
        self.signal(TransportSignal::Closed {
            reason: reason.map(ToOwned::to_owned),
        })
    }

    /// Simulate a transport failure.
    ///
    /// # Errors
    /// Returns error if the client dropped the channel.
    pub fn fail(&self, message: impl Into<String>) -> Result<(), SendError> {
        self.signal(TransportSignal::Error(message.into()))
    }

    /// Deliver a raw transport signal.
    ///
    /// # Errors
    /// Returns error if the client dropped the channel.
    pub fn signal(&self, signal: TransportSignal) -> Result<(), SendError> {
        self.incoming
            .send(signal)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Receive the next frame sent by the client.
    pub async fn recv(&mut self) -> Option<String> {
        self.outgoing.recv().await
    }

    /// Receive a frame sent by the client (non-blocking).
    pub fn try_recv(&mut self) -> Option<String> {
        self.outgoing.try_recv().ok()
    }

    /// Whether the client has dropped its side of the channel.
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.incoming.is_closed()
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}
