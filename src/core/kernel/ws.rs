use crate::core::config::TimeoutConfig;
use crate::core::errors::{ExchangeError, Stage};
use crate::core::kernel::transport;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tokio_tungstenite::{client_async, tungstenite::protocol::Message, WebSocketStream};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One frame as seen by the connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    /// Ping, pong or raw frame; already handled by the transport
    Control,
}

/// An upgraded WebSocket session - pure transport layer
#[async_trait]
pub trait WsSession: Send {
    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError>;

    /// Receive the next frame
    ///
    /// Peer close, end of stream and read errors all surface as
    /// `ExchangeError::SessionClosed`.
    async fn next_frame(&mut self) -> Result<WsFrame, ExchangeError>;

    /// Close the connection, ignoring failures
    async fn close(&mut self);
}

/// Opens WebSocket sessions
#[async_trait]
pub trait WsConnector: Send + Sync {
    type Session: WsSession + 'static;

    async fn connect(&self, endpoint: &Url) -> Result<Self::Session, ExchangeError>;
}

/// Tungstenite-based connector: resolve, TCP, TLS, then upgrade over the
/// same TLS stream
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    exchange_name: String,
    timeouts: TimeoutConfig,
}

impl TungsteniteConnector {
    pub fn new(exchange_name: String, timeouts: TimeoutConfig) -> Self {
        Self {
            exchange_name,
            timeouts,
        }
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    type Session = TungsteniteSession;

    #[instrument(
        skip(self),
        fields(exchange = %self.exchange_name, host = endpoint.host_str().unwrap_or_default())
    )]
    async fn connect(&self, endpoint: &Url) -> Result<Self::Session, ExchangeError> {
        let host = endpoint
            .host_str()
            .ok_or_else(|| ExchangeError::WsUpgradeError(format!("No host in {}", endpoint)))?;
        let port = endpoint.port_or_known_default().unwrap_or(443);

        let addrs = transport::resolve(host, port, self.timeouts.resolve).await?;
        let tcp = transport::connect(&addrs, self.timeouts.connect).await?;
        let tls = transport::tls_handshake(host, tcp, self.timeouts.tls_handshake).await?;

        let upgrade = client_async(endpoint.as_str(), tls);
        let (stream, response) = timeout(self.timeouts.ws_upgrade, upgrade)
            .await
            .map_err(|_| ExchangeError::Timeout(Stage::WsUpgrade))?
            .map_err(|e| ExchangeError::WsUpgradeError(e.to_string()))?;

        info!(status = %response.status(), "WebSocket connected");

        Ok(TungsteniteSession {
            stream,
            exchange_name: self.exchange_name.clone(),
        })
    }
}

pub struct TungsteniteSession {
    stream: WebSocketStream<TlsStream<TcpStream>>,
    exchange_name: String,
}

#[async_trait]
impl WsSession for TungsteniteSession {
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ExchangeError::SessionClosed(format!("Failed to send frame: {}", e)))
    }

    async fn next_frame(&mut self) -> Result<WsFrame, ExchangeError> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(WsFrame::Text(text)),
            Some(Ok(Message::Binary(data))) => {
                Ok(WsFrame::Text(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(Ok(Message::Ping(data))) => {
                // Auto-respond to pings at transport level
                if let Err(e) = self.stream.send(Message::Pong(data)).await {
                    warn!(exchange = %self.exchange_name, "Failed to send pong response: {}", e);
                }
                Ok(WsFrame::Control)
            }
            Some(Ok(Message::Pong(_) | Message::Frame(_))) => Ok(WsFrame::Control),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "closed by peer".to_string(),
                    |f| format!("closed by peer: {} {}", f.code, f.reason),
                );
                Err(ExchangeError::SessionClosed(reason))
            }
            Some(Err(e)) => Err(ExchangeError::SessionClosed(e.to_string())),
            None => Err(ExchangeError::SessionClosed("stream ended".to_string())),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(exchange = %self.exchange_name, "Close handshake failed: {}", e);
        }
    }
}
