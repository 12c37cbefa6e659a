use crate::core::errors::ExchangeError;
use crate::core::types::StreamEvent;

/// Outcome of decoding one text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A domain event for the sink
    Event(StreamEvent),
    /// Protocol chatter (welcome, pong, ack) with nothing to deliver
    Control(&'static str),
    /// Well-formed payload with a discriminant outside the known set
    Unknown(String),
}

/// Codec trait for handling exchange-specific WebSocket message encoding/decoding
///
/// Each exchange implements this trait to handle its specific message formats.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode the subscription frames for the given topics
    ///
    /// An empty vector means the exchange needs no subscription frame.
    fn encode_subscription(&self, topics: &[String]) -> Result<Vec<String>, ExchangeError>;

    /// Encode an application-level ping, if the exchange uses one
    fn encode_ping(&self) -> Option<String> {
        None
    }

    /// Decode one text frame
    ///
    /// # Returns
    /// - `Ok(decoded)` - The frame was well-formed
    /// - `Err(ExchangeError::ParseError)` - The payload could not be parsed
    fn decode_message(&self, text: &str) -> Result<Decoded, ExchangeError>;
}
