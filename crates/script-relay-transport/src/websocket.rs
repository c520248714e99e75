//! WebSocket transport built on tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use script_relay_core::{ChannelError, Connector, Duplex, TransportSignal};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Options for the WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnectorOptions {
    /// Send a WebSocket ping at this interval. `None` disables keep-alive.
    pub ping_interval: Option<Duration>,
    /// Give up on the handshake after this long.
    pub handshake_timeout: Duration,
}

impl Default for WsConnectorOptions {
    fn default() -> Self {
        Self {
            ping_interval: None,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

impl WsConnectorOptions {
    /// Enable keep-alive pings.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Opens duplex channels over WebSocket.
///
/// Each channel gets a pump task that forwards socket frames as
/// [`TransportSignal`]s and writes outgoing text frames. The task ends when
/// the socket closes or the [`Duplex`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    options: WsConnectorOptions,
}

impl WebSocketConnector {
    #[must_use]
    pub const fn new(options: WsConnectorOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Duplex, ChannelError> {
        let handshake = connect_async(url.as_str());
        let (socket, _response) = tokio::time::timeout(self.options.handshake_timeout, handshake)
            .await
            .map_err(|_| ChannelError::Handshake("timed out".to_string()))?
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;

        tracing::info!("WebSocket connected to {}", url);

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let _ = incoming_tx.send(TransportSignal::Opened);

        tokio::spawn(pump(
            socket,
            outgoing_rx,
            incoming_tx,
            self.options.ping_interval,
        ));

        Ok(Duplex {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

async fn pump(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<TransportSignal>,
    ping_interval: Option<Duration>,
) {
    let (mut write, mut read) = socket.split();
    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        tokio::select! {
            msg = read.next() => {
                let signal = match msg {
                    Some(Ok(Message::Text(text))) => TransportSignal::Frame(text),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => TransportSignal::Frame(text),
                        Err(_) => {
                            tracing::warn!("Dropping non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = incoming.send(TransportSignal::Closed { reason });
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {e}");
                        let _ = incoming.send(TransportSignal::Error(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = incoming.send(TransportSignal::Closed { reason: None });
                        break;
                    }
                };
                if incoming.send(signal).is_err() {
                    tracing::debug!("Session dropped the channel, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
            out = outgoing.recv() => {
                match out {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("Failed to send frame: {e}");
                            let _ = incoming.send(TransportSignal::Error(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Session dropped the channel, closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            () = tick(ping.as_mut()) => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    let _ = incoming.send(TransportSignal::Error(e.to_string()));
                    break;
                }
            }
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
