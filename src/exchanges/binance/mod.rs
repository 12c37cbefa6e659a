pub mod codec;
pub mod negotiator;
pub mod types;

use crate::core::config::{ConnectorConfig, ExchangeCredentials};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{HyperRest, RestClientConfig, StreamConnector, TungsteniteConnector};
use crate::core::traits::EventSink;

// Re-export main types for easier importing
pub use codec::BinanceUserCodec;
pub use negotiator::{BinanceUserConfig, BinanceUserStream};
pub use types::{
    BinanceAccountPosition, BinanceBalanceUpdate, BinanceExecutionReport, BinanceListenKey,
    BinancePositionBalance,
};

/// Production user-data connector over hyper and tungstenite
pub type BinanceUserConnector<S> =
    StreamConnector<BinanceUserStream, HyperRest, TungsteniteConnector, S>;

/// Create a Binance spot user-data connector delivering into `sink`
pub fn create_binance_user_connector<S: EventSink>(
    credentials: &ExchangeCredentials,
    stream_config: BinanceUserConfig,
    connector_config: &ConnectorConfig,
    sink: S,
) -> Result<BinanceUserConnector<S>, ExchangeError> {
    let protocol = BinanceUserStream::new(credentials, stream_config)?;
    let rest = HyperRest::new(
        RestClientConfig::new("binance".to_string())
            .with_timeouts(connector_config.timeouts)
            .with_user_agent(connector_config.user_agent.clone()),
    );
    let ws = TungsteniteConnector::new("binance".to_string(), connector_config.timeouts);
    Ok(StreamConnector::new(protocol, rest, ws, sink, connector_config))
}
