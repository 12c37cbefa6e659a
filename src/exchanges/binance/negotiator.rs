use super::codec::BinanceUserCodec;
use super::types::BinanceListenKey;
use crate::core::config::{ConfigError, ExchangeCredentials};
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::get_timestamp;
use crate::core::kernel::{ApiKeySigner, KeepalivePolicy, RestClient, RestRequest};
use crate::core::traits::{SessionPlan, SilentStages, StageObserver, StreamProtocol};
use crate::core::types::{AuthToken, ExchangeId, SubscriptionDescriptor, TradeType};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};
use url::Url;

pub const REST_HOST: &str = "api.binance.com";
pub const WS_BASE_URL: &str = "wss://stream.binance.com:9443/ws";
pub const LISTEN_KEY_TARGET: &str = "/api/v3/userDataStream";
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Endpoints and listen-key timing for the spot user-data stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceUserConfig {
    pub rest_host: String,
    pub rest_port: u16,
    pub ws_base_url: String,
    /// How often the key is re-issued while streaming
    pub renewal_interval: Duration,
    /// Delay before retrying a rejected renewal
    pub renewal_retry: Duration,
    /// Hard expiry of a key that is never renewed
    pub listen_key_validity: Duration,
}

impl Default for BinanceUserConfig {
    fn default() -> Self {
        Self {
            rest_host: REST_HOST.to_string(),
            rest_port: 443,
            ws_base_url: WS_BASE_URL.to_string(),
            renewal_interval: Duration::from_secs(30 * 60),
            renewal_retry: Duration::from_secs(60),
            listen_key_validity: Duration::from_secs(60 * 60),
        }
    }
}

impl BinanceUserConfig {
    pub fn testnet() -> Self {
        Self {
            rest_host: "testnet.binance.vision".to_string(),
            ws_base_url: "wss://testnet.binance.vision/ws".to_string(),
            ..Self::default()
        }
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    pub fn with_renewal_retry(mut self, retry: Duration) -> Self {
        self.renewal_retry = retry;
        self
    }

    pub fn with_listen_key_validity(mut self, validity: Duration) -> Self {
        self.listen_key_validity = validity;
        self
    }
}

/// Listen-key negotiator for the Binance spot user-data stream
///
/// Bootstrap is one POST authenticated by the API key header. The key is
/// kept alive by a PUT naming the same key every `renewal_interval`.
pub struct BinanceUserStream {
    config: BinanceUserConfig,
    signer: ApiKeySigner,
    subscription: SubscriptionDescriptor,
}

impl BinanceUserStream {
    pub fn new(
        credentials: &ExchangeCredentials,
        config: BinanceUserConfig,
    ) -> Result<Self, ExchangeError> {
        if credentials.api_key().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "Binance user data stream requires an API key".to_string(),
            )
            .into());
        }
        Ok(Self {
            config,
            signer: ApiKeySigner::new(API_KEY_HEADER, credentials.api_key().to_string()),
            subscription: SubscriptionDescriptor::user_data(TradeType::Spot),
        })
    }

    pub fn config(&self) -> &BinanceUserConfig {
        &self.config
    }

    fn listen_key_request(&self, request: RestRequest) -> Result<RestRequest, ExchangeError> {
        request
            .with_port(self.config.rest_port)
            .sign(&self.signer, get_timestamp()?)
    }

    fn stream_endpoint(&self, listen_key: &str) -> Result<Url, ExchangeError> {
        let raw = format!(
            "{}/{}",
            self.config.ws_base_url.trim_end_matches('/'),
            listen_key
        );
        Url::parse(&raw).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid stream URL {}: {}", raw, e)).into()
        })
    }
}

#[async_trait]
impl StreamProtocol for BinanceUserStream {
    type Codec = BinanceUserCodec;

    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn subscription(&self) -> &SubscriptionDescriptor {
        &self.subscription
    }

    fn codec(&self) -> Self::Codec {
        BinanceUserCodec
    }

    #[instrument(skip_all, fields(exchange = "binance", host = %self.config.rest_host))]
    async fn bootstrap(
        &self,
        rest: &dyn RestClient,
        stages: &dyn StageObserver,
    ) -> Result<SessionPlan, ExchangeError> {
        let request = self
            .listen_key_request(RestRequest::post(&self.config.rest_host, LISTEN_KEY_TARGET))?;
        let body = rest
            .execute(request, stages)
            .await
            .map_err(ExchangeError::into_bootstrap_failure)?;

        let response: BinanceListenKey = serde_json::from_str(&body).map_err(|e| {
            ExchangeError::BootstrapFailed(format!("Unexpected listen key response: {}", e))
        })?;
        if response.listen_key.is_empty() {
            return Err(ExchangeError::BootstrapFailed(
                "Empty listen key returned".to_string(),
            ));
        }

        info!("Obtained listen key");
        Ok(SessionPlan {
            endpoint: self.stream_endpoint(&response.listen_key)?,
            token: AuthToken::ListenKey {
                key: response.listen_key,
                issued_at: Instant::now(),
                validity: self.config.listen_key_validity,
            },
            keepalive: KeepalivePolicy::ListenKeyRenewal {
                interval: self.config.renewal_interval,
                retry: self.config.renewal_retry,
            },
            topics: Vec::new(),
        })
    }

    async fn renew(&self, rest: &dyn RestClient, token: &AuthToken) -> Result<(), ExchangeError> {
        let target = format!("{}?listenKey={}", LISTEN_KEY_TARGET, token.value());
        let request = self.listen_key_request(RestRequest::put(&self.config.rest_host, target))?;
        rest.execute(request, &SilentStages).await?;
        Ok(())
    }
}
