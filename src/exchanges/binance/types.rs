use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BinanceListenKey {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

// WebSocket user-data payloads
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub order_status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub last_filled_quantity: Decimal,
    #[serde(rename = "z", with = "rust_decimal::serde::str")]
    pub cumulative_filled_quantity: Decimal,
    #[serde(rename = "L", with = "rust_decimal::serde::str")]
    pub last_filled_price: Decimal,
    #[serde(rename = "n", with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    #[serde(rename = "N")]
    pub commission_asset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceBalanceUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d", with = "rust_decimal::serde::str")]
    pub delta: Decimal,
    #[serde(rename = "T")]
    pub clear_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountPosition {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "u")]
    pub last_update: i64,
    #[serde(rename = "B")]
    pub balances: Vec<BinancePositionBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinancePositionBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f", with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}
