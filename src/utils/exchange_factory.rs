use crate::core::config::{ConfigError, ConnectorConfig, ExchangeCredentials};
use crate::core::errors::ExchangeError;
use crate::core::traits::{EventSink, ManagedStream};
use crate::exchanges::binance::{self, BinanceUserConfig};
use crate::exchanges::kucoin::{self, KucoinStreamConfig};
use std::fmt;
use std::str::FromStr;

/// Supported stream kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    BinanceUser,
    KucoinSpot,
    KucoinFutures,
}

impl ExchangeKind {
    pub const ALL: [Self; 3] = [Self::BinanceUser, Self::KucoinSpot, Self::KucoinFutures];

    /// Prefix of the `{PREFIX}_API_KEY` style variables holding credentials
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::BinanceUser => "BINANCE",
            Self::KucoinSpot | Self::KucoinFutures => "KUCOIN",
        }
    }

    pub const fn requires_credentials(self) -> bool {
        matches!(self, Self::BinanceUser)
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinanceUser => write!(f, "binance-user"),
            Self::KucoinSpot => write!(f, "kucoin-spot"),
            Self::KucoinFutures => write!(f, "kucoin-futures"),
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "binance" | "binance-user" => Ok(Self::BinanceUser),
            "kucoin" | "kucoin-spot" => Ok(Self::KucoinSpot),
            "kucoin-futures" => Ok(Self::KucoinFutures),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "Unknown exchange kind '{}', expected one of binance-user, kucoin-spot, kucoin-futures",
                other
            ))),
        }
    }
}

/// Factory for creating production stream connectors
pub struct ExchangeFactory;

impl ExchangeFactory {
    /// Create a connector for `kind`, not yet running
    ///
    /// `symbols` is ignored by the user-data stream. KuCoin streams accept
    /// an empty list meaning every instrument.
    pub fn create_stream<S: EventSink>(
        kind: ExchangeKind,
        symbols: Vec<String>,
        credentials: Option<&ExchangeCredentials>,
        config: &ConnectorConfig,
        sink: S,
    ) -> Result<Box<dyn ManagedStream>, ExchangeError> {
        match kind {
            ExchangeKind::BinanceUser => {
                let credentials = credentials.ok_or_else(|| {
                    ConfigError::InvalidConfiguration(
                        "binance-user requires BINANCE_API_KEY".to_string(),
                    )
                })?;
                Ok(Box::new(binance::create_binance_user_connector(
                    credentials,
                    BinanceUserConfig::default(),
                    config,
                    sink,
                )?))
            }
            ExchangeKind::KucoinSpot => Ok(Box::new(kucoin::create_kucoin_price_connector(
                KucoinStreamConfig::spot(symbols),
                credentials,
                config,
                sink,
            )?)),
            ExchangeKind::KucoinFutures => Ok(Box::new(kucoin::create_kucoin_price_connector(
                KucoinStreamConfig::futures(symbols),
                credentials,
                config,
                sink,
            )?)),
        }
    }

    /// Credentials for `kind` from the environment, if any are set
    pub fn credentials_from_env(kind: ExchangeKind) -> Option<ExchangeCredentials> {
        #[cfg(feature = "env-file")]
        let credentials = ExchangeCredentials::from_env_file(kind.env_prefix());
        #[cfg(not(feature = "env-file"))]
        let credentials = ExchangeCredentials::from_env(kind.env_prefix());

        credentials.ok().filter(ExchangeCredentials::has_credentials)
    }
}
