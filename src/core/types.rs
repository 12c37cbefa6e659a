use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Kucoin,
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Kucoin => write!(f, "kucoin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Spot,
    Futures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    UserData,
    MarketData,
}

/// What one connector subscribes to; fixed for the connector's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    pub trade_type: TradeType,
    pub symbols: Vec<String>,
    pub kind: StreamKind,
}

impl SubscriptionDescriptor {
    pub fn user_data(trade_type: TradeType) -> Self {
        Self {
            trade_type,
            symbols: Vec::new(),
            kind: StreamKind::UserData,
        }
    }

    pub fn market_data(trade_type: TradeType, symbols: Vec<String>) -> Self {
        Self {
            trade_type,
            symbols,
            kind: StreamKind::MarketData,
        }
    }
}

/// Authorization material obtained during bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// Renewable key authorizing a user-data stream
    ListenKey {
        key: String,
        issued_at: Instant,
        validity: Duration,
    },
    /// Single-use token consumed by one WebSocket connect
    Subscription(String),
}

impl AuthToken {
    pub fn value(&self) -> &str {
        match self {
            Self::ListenKey { key, .. } => key,
            Self::Subscription(token) => token,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        match self {
            Self::ListenKey {
                issued_at,
                validity,
                ..
            } => Some(*issued_at + *validity),
            Self::Subscription(_) => None,
        }
    }
}

/// One candidate WebSocket endpoint returned by token negotiation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServer {
    pub endpoint: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub encrypt: bool,
}

impl InstanceServer {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    ResolvingDns,
    TcpConnecting,
    TlsHandshaking,
    Bootstrapping,
    WsUpgrading,
    Subscribing,
    Streaming,
    Stopping,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fields common to every streamed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventHeader {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

impl EventHeader {
    /// Build a header from an exchange timestamp in milliseconds
    pub fn from_millis(exchange: ExchangeId, symbol: impl Into<String>, millis: i64) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            timestamp: timestamp_from_millis(millis),
        }
    }
}

/// Exchange millisecond timestamp to UTC; out-of-range values map to now
pub fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub header: EventHeader,
    pub client_order_id: String,
    pub order_id: i64,
    pub side: String,
    pub order_type: String,
    pub execution_type: String,
    pub order_status: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub last_filled_quantity: Decimal,
    pub last_filled_price: Decimal,
    pub cumulative_filled_quantity: Decimal,
    pub commission: Decimal,
    pub commission_asset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    /// `symbol` carries the asset whose balance changed
    pub header: EventHeader,
    pub delta: Decimal,
    pub clear_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountPosition {
    pub header: EventHeader,
    pub last_update: DateTime<Utc>,
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerUpdate {
    pub header: EventHeader,
    pub trade_type: TradeType,
    pub price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub size: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum StreamEvent {
    ExecutionReport(ExecutionReport),
    BalanceUpdate(BalanceUpdate),
    AccountPosition(AccountPosition),
    TickerUpdate(TickerUpdate),
}

impl StreamEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            Self::ExecutionReport(e) => &e.header,
            Self::BalanceUpdate(e) => &e.header,
            Self::AccountPosition(e) => &e.header,
            Self::TickerUpdate(e) => &e.header,
        }
    }
}
