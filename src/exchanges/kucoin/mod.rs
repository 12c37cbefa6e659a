pub mod codec;
pub mod negotiator;
pub mod types;

use crate::core::config::{ConnectorConfig, ExchangeCredentials};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{HyperRest, RestClientConfig, StreamConnector, TungsteniteConnector};
use crate::core::traits::EventSink;

// Re-export main types for easier importing
pub use codec::KucoinCodec;
pub use negotiator::{KucoinPriceStream, KucoinStreamConfig, MAX_SYMBOLS_PER_TOPIC};
pub use types::{
    KucoinBullet, KucoinContract, KucoinFuturesTicker, KucoinResponse, KucoinSpotTicker,
};

/// Production price connector over hyper and tungstenite
pub type KucoinPriceConnector<S> =
    StreamConnector<KucoinPriceStream, HyperRest, TungsteniteConnector, S>;

/// Create a KuCoin price connector delivering into `sink`
///
/// Credentials are optional; when present the private bullet endpoint is
/// used.
pub fn create_kucoin_price_connector<S: EventSink>(
    stream_config: KucoinStreamConfig,
    credentials: Option<&ExchangeCredentials>,
    connector_config: &ConnectorConfig,
    sink: S,
) -> Result<KucoinPriceConnector<S>, ExchangeError> {
    let protocol = match credentials {
        Some(credentials) => KucoinPriceStream::with_credentials(stream_config, credentials)?,
        None => KucoinPriceStream::new(stream_config),
    };
    let rest = HyperRest::new(
        RestClientConfig::new("kucoin".to_string())
            .with_timeouts(connector_config.timeouts)
            .with_user_agent(connector_config.user_agent.clone()),
    );
    let ws = TungsteniteConnector::new("kucoin".to_string(), connector_config.timeouts);
    Ok(StreamConnector::new(protocol, rest, ws, sink, connector_config))
}
