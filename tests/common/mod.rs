#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamlink::core::config::{ConnectorConfig, ExchangeCredentials};
use streamlink::core::errors::{ExchangeError, HttpFailure};
use streamlink::core::kernel::{
    HttpMethod, RestClient, RestRequest, WsConnector, WsFrame, WsSession,
};
use streamlink::core::traits::StageObserver;
use streamlink::ConnectionState;
use tokio::sync::{mpsc, watch};
use url::Url;

type Responder = dyn Fn(&RestRequest, usize) -> Result<String, ExchangeError> + Send + Sync;

/// REST client answering from a closure; the second argument counts calls
#[derive(Clone)]
pub struct FakeRest {
    requests: Arc<Mutex<Vec<RestRequest>>>,
    responder: Arc<Responder>,
    delay: Option<Duration>,
}

impl FakeRest {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RestRequest, usize) -> Result<String, ExchangeError> + Send + Sync + 'static,
    {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            delay: None,
        }
    }

    /// Listen keys `key-1`, `key-2`, ... for every POST; every renewal
    /// succeeds
    pub fn binance() -> Self {
        Self::binance_with_failed_renewals(0)
    }

    /// Like [`FakeRest::binance`], but the first `failures` renewals are
    /// rejected
    pub fn binance_with_failed_renewals(failures: usize) -> Self {
        let issued = Arc::new(AtomicUsize::new(0));
        let renewals = Arc::new(AtomicUsize::new(0));
        Self::new(move |request, _| match request.method {
            HttpMethod::Post => {
                let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!(r#"{{"listenKey":"key-{}"}}"#, n))
            }
            HttpMethod::Put if renewals.fetch_add(1, Ordering::SeqCst) < failures => {
                Err(HttpFailure::Status {
                    status: 400,
                    body: r#"{"code":-1125,"msg":"This listenKey does not exist."}"#.into(),
                }
                .into())
            }
            _ => Ok("{}".to_string()),
        })
    }

    /// Bullet tokens `token-1`, `token-2`, ... with one instance server
    pub fn kucoin() -> Self {
        let issued = Arc::new(AtomicUsize::new(0));
        Self::new(move |_, _| {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!(
                r#"{{"code":"200000","data":{{"token":"token-{}","instanceServers":[
                    {{"endpoint":"wss://ws-api-spot.kucoin.com/","encrypt":true,"protocol":"websocket",
                      "pingInterval":18000,"pingTimeout":10000}}]}}}}"#,
                n
            ))
        })
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: HttpMethod) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

#[async_trait]
impl RestClient for FakeRest {
    async fn execute(
        &self,
        request: RestRequest,
        stages: &dyn StageObserver,
    ) -> Result<String, ExchangeError> {
        stages.enter(ConnectionState::ResolvingDns);
        stages.enter(ConnectionState::TcpConnecting);
        stages.enter(ConnectionState::TlsHandshaking);
        stages.enter(ConnectionState::Bootstrapping);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        (self.responder)(&request, n)
    }
}

/// Test-side handle of one fake WebSocket session
#[derive(Clone)]
pub struct SessionControl {
    pub endpoint: Url,
    frames: mpsc::UnboundedSender<Result<WsFrame, ExchangeError>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Ok(WsFrame::Text(text.into())));
    }

    pub fn push_error(&self, error: ExchangeError) {
        let _ = self.frames.send(Err(error));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    frames: mpsc::UnboundedReceiver<Result<WsFrame, ExchangeError>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl WsSession for FakeSession {
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<WsFrame, ExchangeError> {
        match self.frames.recv().await {
            Some(frame) => frame,
            None => Err(ExchangeError::SessionClosed("stream ended".into())),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// WebSocket connector handing every opened session to the test
#[derive(Clone)]
pub struct FakeWs {
    connects: Arc<Mutex<Vec<Url>>>,
    failures_left: Arc<AtomicUsize>,
    sessions: mpsc::UnboundedSender<SessionControl>,
}

impl FakeWs {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionControl>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (
            Self {
                connects: Arc::new(Mutex::new(Vec::new())),
                failures_left: Arc::new(AtomicUsize::new(0)),
                sessions,
            },
            rx,
        )
    }

    /// Fail the next `count` upgrades
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<Url> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl WsConnector for FakeWs {
    type Session = FakeSession;

    async fn connect(&self, endpoint: &Url) -> Result<Self::Session, ExchangeError> {
        self.connects.lock().push(endpoint.clone());
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExchangeError::WsUpgradeError("handshake rejected".into()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.sessions.send(SessionControl {
            endpoint: endpoint.clone(),
            frames: frames_tx,
            sent: sent.clone(),
            closed: closed.clone(),
        });
        Ok(FakeSession {
            frames: frames_rx,
            sent,
            closed,
        })
    }
}

pub fn binance_credentials() -> ExchangeCredentials {
    ExchangeCredentials::new("binance", "test-key".into(), "test-secret".into())
}

pub fn connector_config() -> ConnectorConfig {
    ConnectorConfig::default().with_backoff(Duration::from_secs(5))
}

pub async fn wait_for_state(states: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    states
        .wait_for(|current| *current == state)
        .await
        .map(|_| ())
        .unwrap_or_else(|_| panic!("connector dropped before reaching {}", state));
}

pub fn execution_report(order_id: i64) -> String {
    format!(
        r#"{{"e":"executionReport","E":{},"s":"BTCUSDT","c":"client-{}","S":"BUY","o":"LIMIT",
            "f":"GTC","q":"1.0","p":"61000.0","x":"NEW","X":"NEW","i":{},"l":"0","z":"0",
            "L":"0","n":"0","N":null,"T":1700000000000}}"#,
        1_700_000_000_000_i64 + order_id,
        order_id,
        order_id
    )
}
