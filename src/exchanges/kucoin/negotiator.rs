use super::codec::{KucoinCodec, FUTURES_TICKER_TOPIC, SPOT_ALL_TICKERS_TOPIC, SPOT_TICKER_TOPIC};
use super::types::{KucoinBullet, KucoinContract, KucoinResponse};
use crate::core::config::{ConfigError, ExchangeCredentials};
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::get_timestamp;
use crate::core::kernel::{HmacSigner, KeepalivePolicy, RestClient, RestRequest, SignatureHeaders};
use crate::core::traits::{SessionPlan, StageObserver, StreamProtocol};
use crate::core::types::{AuthToken, ExchangeId, InstanceServer, SubscriptionDescriptor, TradeType};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

pub const SPOT_REST_HOST: &str = "api.kucoin.com";
pub const FUTURES_REST_HOST: &str = "api-futures.kucoin.com";
pub const PUBLIC_BULLET_TARGET: &str = "/api/v1/bullet-public";
pub const PRIVATE_BULLET_TARGET: &str = "/api/v1/bullet-private";
pub const ACTIVE_CONTRACTS_TARGET: &str = "/api/v1/contracts/active";
pub const MAX_SYMBOLS_PER_TOPIC: usize = 100;

const SUCCESS_CODE: &str = "200000";
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(18);
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KucoinStreamConfig {
    /// Market and symbols; no symbols means every instrument
    pub subscription: SubscriptionDescriptor,
    pub rest_host: String,
    pub rest_port: u16,
}

impl KucoinStreamConfig {
    pub fn spot(symbols: Vec<String>) -> Self {
        Self {
            subscription: SubscriptionDescriptor::market_data(TradeType::Spot, symbols),
            rest_host: SPOT_REST_HOST.to_string(),
            rest_port: 443,
        }
    }

    pub fn futures(symbols: Vec<String>) -> Self {
        Self {
            subscription: SubscriptionDescriptor::market_data(TradeType::Futures, symbols),
            rest_host: FUTURES_REST_HOST.to_string(),
            rest_port: 443,
        }
    }

    pub fn with_rest_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.rest_host = host.into();
        self.rest_port = port;
        self
    }
}

/// Token and instance-server negotiator for KuCoin price streams
///
/// Each bootstrap fetches a new single-use token, so a failed connect never
/// retries a stale one.
pub struct KucoinPriceStream {
    config: KucoinStreamConfig,
    signer: Option<HmacSigner>,
}

impl KucoinPriceStream {
    /// Public feed; no credentials involved
    pub fn new(config: KucoinStreamConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Request tokens from the private bullet endpoint
    pub fn with_credentials(
        config: KucoinStreamConfig,
        credentials: &ExchangeCredentials,
    ) -> Result<Self, ExchangeError> {
        if !credentials.has_credentials() {
            return Ok(Self::new(config));
        }
        let passphrase = credentials.passphrase().ok_or_else(|| {
            ConfigError::InvalidConfiguration("KuCoin credentials require a passphrase".to_string())
        })?;
        Ok(Self {
            config,
            signer: Some(HmacSigner::new(
                credentials.api_key().to_string(),
                credentials.secret_key().to_string(),
                Some(passphrase.to_string()),
                SignatureHeaders::kucoin(),
            )),
        })
    }

    pub fn config(&self) -> &KucoinStreamConfig {
        &self.config
    }

    pub fn is_private(&self) -> bool {
        self.signer.is_some()
    }

    /// Subscription topics, at most `MAX_SYMBOLS_PER_TOPIC` symbols each
    pub fn topics_for(&self, symbols: &[String]) -> Vec<String> {
        let prefix = match self.config.subscription.trade_type {
            TradeType::Spot if symbols.is_empty() => {
                return vec![SPOT_ALL_TICKERS_TOPIC.to_string()]
            }
            TradeType::Spot => SPOT_TICKER_TOPIC,
            TradeType::Futures => FUTURES_TICKER_TOPIC,
        };
        symbols
            .chunks(MAX_SYMBOLS_PER_TOPIC)
            .map(|chunk| format!("{}:{}", prefix, chunk.join(",")))
            .collect()
    }

    async fn discover_contracts(
        &self,
        rest: &dyn RestClient,
        stages: &dyn StageObserver,
    ) -> Result<Vec<String>, ExchangeError> {
        let request = RestRequest::get(&self.config.rest_host, ACTIVE_CONTRACTS_TARGET)
            .with_port(self.config.rest_port);
        let contracts: Vec<KucoinContract> = self.call(rest, request, stages).await?;

        let symbols: Vec<String> = contracts
            .into_iter()
            .filter(|c| c.status.as_deref().map_or(true, |s| s.eq_ignore_ascii_case("open")))
            .map(|c| c.symbol)
            .collect();
        if symbols.is_empty() {
            return Err(ExchangeError::BootstrapFailed(
                "No active futures contracts".to_string(),
            ));
        }
        info!(count = symbols.len(), "Discovered active contracts");
        Ok(symbols)
    }

    async fn request_token(
        &self,
        rest: &dyn RestClient,
        stages: &dyn StageObserver,
    ) -> Result<KucoinBullet, ExchangeError> {
        let request = match &self.signer {
            Some(signer) => RestRequest::post(&self.config.rest_host, PRIVATE_BULLET_TARGET)
                .with_port(self.config.rest_port)
                .sign(signer, get_timestamp()?)?,
            None => RestRequest::post(&self.config.rest_host, PUBLIC_BULLET_TARGET)
                .with_port(self.config.rest_port),
        };
        self.call(rest, request, stages).await
    }

    /// Execute one request and unwrap the `{code, data}` envelope
    async fn call<T: DeserializeOwned + Send>(
        &self,
        rest: &dyn RestClient,
        request: RestRequest,
        stages: &dyn StageObserver,
    ) -> Result<T, ExchangeError> {
        let target = request.target.clone();
        let body = rest
            .execute(request, stages)
            .await
            .map_err(ExchangeError::into_bootstrap_failure)?;

        let response: KucoinResponse<T> = serde_json::from_str(&body).map_err(|e| {
            ExchangeError::BootstrapFailed(format!("Unexpected response from {}: {}", target, e))
        })?;
        if response.code != SUCCESS_CODE {
            return Err(ExchangeError::BootstrapFailed(format!(
                "{} returned code {}: {}",
                target,
                response.code,
                response.msg.unwrap_or_default()
            )));
        }
        response.data.ok_or_else(|| {
            ExchangeError::BootstrapFailed(format!("No data in {} response", target))
        })
    }
}

/// Connect target for one instance server: `<endpoint>?token=..&connectId=..`
pub fn connect_target(server: &InstanceServer, token: &str) -> Result<Url, ExchangeError> {
    let mut url = Url::parse(&server.endpoint).map_err(|e| {
        ExchangeError::BootstrapFailed(format!(
            "Invalid instance server {}: {}",
            server.endpoint, e
        ))
    })?;
    let connect_id = format!("{:016x}", rand::random::<u64>());
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("connectId", &connect_id);
    Ok(url)
}

/// Idle-ping policy announced by the server, with sane fallbacks for zeros
pub fn ping_policy(server: &InstanceServer) -> KeepalivePolicy {
    let interval = Some(server.ping_interval())
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_PING_INTERVAL);
    let timeout = Some(server.ping_timeout())
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_PING_TIMEOUT);
    KeepalivePolicy::IdlePing { interval, timeout }
}

#[async_trait]
impl StreamProtocol for KucoinPriceStream {
    type Codec = KucoinCodec;

    fn exchange(&self) -> ExchangeId {
        ExchangeId::Kucoin
    }

    fn subscription(&self) -> &SubscriptionDescriptor {
        &self.config.subscription
    }

    fn codec(&self) -> Self::Codec {
        KucoinCodec::new()
    }

    #[instrument(
        skip_all,
        fields(exchange = "kucoin", trade_type = ?self.config.subscription.trade_type)
    )]
    async fn bootstrap(
        &self,
        rest: &dyn RestClient,
        stages: &dyn StageObserver,
    ) -> Result<SessionPlan, ExchangeError> {
        let subscription = &self.config.subscription;
        let symbols = if subscription.symbols.is_empty()
            && subscription.trade_type == TradeType::Futures
        {
            self.discover_contracts(rest, stages).await?
        } else {
            subscription.symbols.clone()
        };

        let bullet = self.request_token(rest, stages).await?;
        let server = bullet.instance_servers.first().ok_or_else(|| {
            ExchangeError::BootstrapFailed("No instance servers returned".to_string())
        })?;
        debug!(
            endpoint = %server.endpoint,
            ping_interval_ms = server.ping_interval,
            "Selected instance server"
        );

        Ok(SessionPlan {
            endpoint: connect_target(server, &bullet.token)?,
            keepalive: ping_policy(server),
            topics: self.topics_for(&symbols),
            token: AuthToken::Subscription(bullet.token),
        })
    }
}
