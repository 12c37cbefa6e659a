use std::fmt;
use thiserror::Error;

/// Deadline-bearing steps of a bootstrap or streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Connect,
    TlsHandshake,
    Send,
    Receive,
    WsUpgrade,
    Idle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "DNS resolution",
            Self::Connect => "TCP connect",
            Self::TlsHandshake => "TLS handshake",
            Self::Send => "request send",
            Self::Receive => "response receive",
            Self::WsUpgrade => "WebSocket upgrade",
            Self::Idle => "idle keepalive",
        };
        f.write_str(name)
    }
}

/// Failure of a single HTTP exchange
#[derive(Error, Debug)]
pub enum HttpFailure {
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Failed to resolve {host}: {reason}")]
    ResolveError { host: String, reason: String },

    #[error("Failed to connect: {0}")]
    ConnectError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] HttpFailure),

    #[error("Bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("WebSocket upgrade failed: {0}")]
    WsUpgradeError(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Failed to parse frame: {0}")]
    ParseError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("{0} timed out")]
    Timeout(Stage),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// Frame-level errors are dropped by the dispatcher and never end a session
    pub const fn is_frame_level(&self) -> bool {
        matches!(self, Self::ParseError(_))
    }

    /// Fold response-level failures of a token request into `BootstrapFailed`
    ///
    /// Network failures keep their own variant so the stage stays visible.
    #[must_use]
    pub fn into_bootstrap_failure(self) -> Self {
        match self {
            Self::HttpError(_) | Self::ParseError(_) | Self::SigningError(_) => {
                Self::BootstrapFailed(self.to_string())
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}
