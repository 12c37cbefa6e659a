use crate::core::config::TimeoutConfig;
use crate::core::errors::{ExchangeError, HttpFailure, Stage};
use crate::core::kernel::signer::Signer;
use crate::core::kernel::transport;
use crate::core::traits::StageObserver;
use crate::core::types::ConnectionState;
use async_trait::async_trait;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Body, Method, Request};
use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    fn to_hyper(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
        }
    }
}

/// One outbound HTTPS request
///
/// Header keys are unique; signing only ever adds or replaces headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    pub host: String,
    pub port: u16,
    pub method: HttpMethod,
    pub target: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RestRequest {
    pub fn new(method: HttpMethod, host: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 443,
            method,
            target: target.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(host: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, host, target)
    }

    pub fn post(host: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, host, target)
    }

    pub fn put(host: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, host, target)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }

    /// Attach authentication headers computed by `signer`
    pub fn sign(mut self, signer: &dyn Signer, timestamp: u64) -> Result<Self, ExchangeError> {
        let body = self.body.as_deref().unwrap_or_default();
        let headers =
            signer.sign_request(self.method.as_str(), &self.target, body.as_bytes(), timestamp)?;
        self.headers.extend(headers);
        Ok(self)
    }

    fn into_http(self, user_agent: &str) -> Result<Request<Body>, ExchangeError> {
        let mut headers = BTreeMap::new();
        headers.insert("Host".to_string(), self.host.clone());
        headers.insert("User-Agent".to_string(), user_agent.to_string());
        headers.insert("Accept".to_string(), "*/*".to_string());
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.5".to_string());
        if self.body.is_some() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if self.method != HttpMethod::Get {
            let length = self.body.as_ref().map_or(0, String::len);
            headers.insert("Content-Length".to_string(), length.to_string());
        }
        headers.extend(self.headers);

        let mut request = Request::new(Body::from(self.body.unwrap_or_default()));
        *request.method_mut() = self.method.to_hyper();
        *request.uri_mut() = self
            .target
            .parse()
            .map_err(|e| HttpFailure::Transport(format!("Invalid target {}: {}", self.target, e)))?;

        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| HttpFailure::Transport(format!("Invalid header {}: {}", key, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| HttpFailure::Transport(format!("Invalid header {}: {}", key, e)))?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

/// REST client trait for bootstrap exchanges
///
/// One call performs one complete request/response cycle and yields the
/// response body exactly once. Nothing is retried here.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn execute(
        &self,
        request: RestRequest,
        stages: &dyn StageObserver,
    ) -> Result<String, ExchangeError>;
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    pub timeouts: TimeoutConfig,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(exchange_name: String) -> Self {
        Self {
            exchange_name,
            timeouts: TimeoutConfig::default(),
            user_agent: "Streamlink/0.1".to_string(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// `RestClient` over a fresh resolve, TCP connection and TLS session per call
#[derive(Debug, Clone)]
pub struct HyperRest {
    config: RestClientConfig,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn transport_error(e: &hyper::Error) -> ExchangeError {
    ExchangeError::HttpError(HttpFailure::Transport(e.to_string()))
}

impl HyperRest {
    pub fn new(config: RestClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RestClient for HyperRest {
    #[instrument(
        skip_all,
        fields(
            exchange = %self.config.exchange_name,
            host = %request.host,
            method = request.method.as_str(),
            target = %request.target
        )
    )]
    async fn execute(
        &self,
        request: RestRequest,
        stages: &dyn StageObserver,
    ) -> Result<String, ExchangeError> {
        let timeouts = &self.config.timeouts;

        stages.enter(ConnectionState::ResolvingDns);
        let addrs = transport::resolve(&request.host, request.port, timeouts.resolve).await?;

        stages.enter(ConnectionState::TcpConnecting);
        let tcp = transport::connect(&addrs, timeouts.connect).await?;

        stages.enter(ConnectionState::TlsHandshaking);
        let tls = transport::tls_handshake(&request.host, tcp, timeouts.tls_handshake).await?;

        stages.enter(ConnectionState::Bootstrapping);
        let (mut sender, connection) = timeout(timeouts.send, hyper::client::conn::handshake(tls))
            .await
            .map_err(|_| ExchangeError::Timeout(Stage::Send))?
            .map_err(|e| transport_error(&e))?;
        let _driver = AbortOnDrop(tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "HTTP connection ended with error");
            }
        }));

        let http_request = request.into_http(&self.config.user_agent)?;
        let response = timeout(timeouts.send, sender.send_request(http_request))
            .await
            .map_err(|_| ExchangeError::Timeout(Stage::Send))?
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let bytes = timeout(timeouts.receive, hyper::body::to_bytes(response.into_body()))
            .await
            .map_err(|_| ExchangeError::Timeout(Stage::Receive))?
            .map_err(|e| transport_error(&e))?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|e| HttpFailure::Transport(format!("Response body is not UTF-8: {}", e)))?;

        trace!(status = status.as_u16(), "Response body: {}", body);

        if status.is_success() {
            Ok(body)
        } else {
            Err(HttpFailure::Status {
                status: status.as_u16(),
                body,
            }
            .into())
        }
    }
}
