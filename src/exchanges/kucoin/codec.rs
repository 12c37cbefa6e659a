use super::types::{KucoinFrame, KucoinFuturesTicker, KucoinSpotTicker};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{Decoded, WsCodec};
use crate::core::types::{EventHeader, ExchangeId, StreamEvent, TickerUpdate, TradeType};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub const SPOT_TICKER_TOPIC: &str = "/market/ticker";
pub const SPOT_ALL_TICKERS_TOPIC: &str = "/market/ticker:all";
pub const FUTURES_TICKER_TOPIC: &str = "/contractMarket/ticker";

const SPOT_TICKER_SUBJECT: &str = "trade.ticker";
const FUTURES_TICKER_SUBJECT: &str = "ticker";

/// Codec for KuCoin spot and futures price feeds
///
/// Frames are routed on `"type"` and then on `"subject"`. Every outbound
/// frame carries a fresh id.
#[derive(Debug)]
pub struct KucoinCodec {
    next_id: AtomicU64,
}

impl Default for KucoinCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl KucoinCodec {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(rand::random::<u32>().into()),
        }
    }

    fn frame_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn decode_data_message(&self, frame: KucoinFrame) -> Result<Decoded, ExchangeError> {
        let topic = frame.topic.unwrap_or_default();
        let subject = frame.subject.unwrap_or_default();
        let data = frame
            .data
            .ok_or_else(|| ExchangeError::ParseError(format!("Missing data for {}", topic)))?;

        if subject == FUTURES_TICKER_SUBJECT && topic.starts_with(FUTURES_TICKER_TOPIC) {
            let ticker: KucoinFuturesTicker = parse_data(data, &topic)?;
            return Ok(Decoded::Event(convert_futures_ticker(ticker)));
        }

        if topic == SPOT_ALL_TICKERS_TOPIC {
            // The aggregate feed names the instrument in the subject
            let ticker: KucoinSpotTicker = parse_data(data, &topic)?;
            return Ok(Decoded::Event(convert_spot_ticker(&subject, ticker)));
        }

        if subject == SPOT_TICKER_SUBJECT {
            let symbol = topic
                .split_once(':')
                .map(|(_, symbol)| symbol)
                .filter(|symbol| !symbol.is_empty() && !symbol.contains(','))
                .ok_or_else(|| {
                    ExchangeError::ParseError(format!("No symbol in ticker topic {}", topic))
                })?;
            let ticker: KucoinSpotTicker = parse_data(data, &topic)?;
            return Ok(Decoded::Event(convert_spot_ticker(symbol, ticker)));
        }

        Ok(Decoded::Unknown(subject))
    }
}

impl WsCodec for KucoinCodec {
    fn encode_subscription(&self, topics: &[String]) -> Result<Vec<String>, ExchangeError> {
        Ok(topics
            .iter()
            .map(|topic| {
                json!({
                    "id": self.frame_id(),
                    "type": "subscribe",
                    "topic": topic,
                    "privateChannel": false,
                    "response": true
                })
                .to_string()
            })
            .collect())
    }

    fn encode_ping(&self) -> Option<String> {
        Some(
            json!({
                "id": self.frame_id(),
                "type": "ping"
            })
            .to_string(),
        )
    }

    fn decode_message(&self, text: &str) -> Result<Decoded, ExchangeError> {
        let frame: KucoinFrame = serde_json::from_str(text)?;
        match frame.frame_type.as_str() {
            "message" => self.decode_data_message(frame),
            "welcome" => Ok(Decoded::Control("welcome")),
            "pong" => Ok(Decoded::Control("pong")),
            "ack" => Ok(Decoded::Control("ack")),
            "error" => {
                warn!(exchange = "kucoin", payload = %text, "Server reported an error");
                Ok(Decoded::Control("error"))
            }
            other => Ok(Decoded::Unknown(other.to_string())),
        }
    }
}

fn parse_data<T: DeserializeOwned>(data: Value, topic: &str) -> Result<T, ExchangeError> {
    serde_json::from_value(data)
        .map_err(|e| ExchangeError::ParseError(format!("Failed to parse {}: {}", topic, e)))
}

pub fn convert_spot_ticker(symbol: &str, ticker: KucoinSpotTicker) -> StreamEvent {
    StreamEvent::TickerUpdate(TickerUpdate {
        header: EventHeader::from_millis(ExchangeId::Kucoin, symbol, ticker.time),
        trade_type: TradeType::Spot,
        price: ticker.price,
        best_bid: ticker.best_bid,
        best_ask: ticker.best_ask,
        size: ticker.size,
    })
}

pub fn convert_futures_ticker(ticker: KucoinFuturesTicker) -> StreamEvent {
    StreamEvent::TickerUpdate(TickerUpdate {
        header: EventHeader::from_millis(ExchangeId::Kucoin, ticker.symbol, ticker.ts / 1_000_000),
        trade_type: TradeType::Futures,
        price: ticker.price,
        best_bid: ticker.best_bid_price,
        best_ask: ticker.best_ask_price,
        size: ticker.size,
    })
}
