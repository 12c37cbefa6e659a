/// Streaming kernel - exchange-agnostic transport and session machinery
///
/// The kernel holds everything a stream needs that does not depend on a
/// particular exchange:
///
/// ## Transport
/// - `transport`: DNS resolution, TCP connect and TLS handshake with deadlines
/// - `RestClient` / `HyperRest`: single-use HTTPS request per bootstrap call
/// - `WsConnector` / `WsSession`: WebSocket upgrade over a fresh TLS stream
///
/// ## Authentication
/// - `Signer`: pluggable request signing
/// - `HmacSigner`: HMAC-SHA256, base64 encoded, KC-API style headers
/// - `ApiKeySigner`: API key header only
///
/// ## Session
/// - `WsCodec`: exchange-specific subscription and frame decoding
/// - `MessageDispatcher`: frame to event routing with drop counters
/// - `KeepaliveScheduler`: listen-key renewal and idle-ping deadlines
/// - `StreamConnector`: the reconnecting state machine tying it together
///
/// Exchange adapters under `crate::exchanges` implement `StreamProtocol` and
/// `WsCodec`; nothing in here knows about a concrete exchange.
pub mod codec;
pub mod connector;
pub mod dispatcher;
pub mod keepalive;
pub mod rest;
pub mod signer;
pub mod transport;
pub mod ws;

// Re-export key types for convenience
pub use codec::{Decoded, WsCodec};
pub use connector::StreamConnector;
pub use dispatcher::{DispatchStats, MessageDispatcher};
pub use keepalive::{KeepaliveEvent, KeepalivePolicy, KeepaliveScheduler};
pub use rest::{HttpMethod, HyperRest, RestClient, RestClientConfig, RestRequest};
pub use signer::{ApiKeySigner, HmacSigner, SignatureHeaders, SignatureResult, Signer};
pub use ws::{TungsteniteConnector, TungsteniteSession, WsConnector, WsFrame, WsSession};
