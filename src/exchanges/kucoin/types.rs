use crate::core::types::InstanceServer;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Envelope of every KuCoin REST response; `code` is `"200000"` on success
#[derive(Debug, Deserialize)]
pub struct KucoinResponse<T> {
    pub code: String,
    pub data: Option<T>,
    pub msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KucoinBullet {
    pub token: String,
    pub instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Deserialize)]
pub struct KucoinContract {
    pub symbol: String,
    pub status: Option<String>,
}

/// Any text frame; `data` is decoded once the subject is known
#[derive(Debug, Deserialize)]
pub struct KucoinFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub topic: Option<String>,
    pub subject: Option<String>,
    pub data: Option<Value>,
}

// WebSocket Types
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KucoinSpotTicker {
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// Milliseconds
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KucoinFuturesTicker {
    pub symbol: String,
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub best_bid_price: Option<Decimal>,
    pub best_ask_price: Option<Decimal>,
    /// Nanoseconds
    pub ts: i64,
}
