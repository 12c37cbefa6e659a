mod common;

use common::{
    binance_credentials, connector_config, execution_report, wait_for_state, FakeRest, FakeWs,
};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use streamlink::core::errors::{ExchangeError, HttpFailure, Stage};
use streamlink::core::kernel::{HttpMethod, StreamConnector};
use streamlink::core::traits::FnSink;
use streamlink::exchanges::binance::{BinanceUserConfig, BinanceUserStream};
use streamlink::exchanges::kucoin::{KucoinPriceStream, KucoinStreamConfig};
use streamlink::{ConnectionState, ManagedStream, StreamEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

fn user_stream() -> BinanceUserStream {
    BinanceUserStream::new(&binance_credentials(), BinanceUserConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_streaming_silences_sink() {
    let (ws, mut sessions) = FakeWs::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector =
        StreamConnector::new(user_stream(), FakeRest::binance(), ws, tx, &connector_config());

    connector.run();
    let session = sessions.recv().await.unwrap();
    session.push_text(execution_report(1));
    assert!(matches!(rx.recv().await, Some(StreamEvent::ExecutionReport(_))));

    connector.stop();
    assert_eq!(connector.current_state(), ConnectionState::Stopped);

    session.push_text(execution_report(2));
    // The aborted task drops the sink; nothing was delivered in between
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sink_can_stop_its_connector() {
    let (ws, mut sessions) = FakeWs::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let owner: Arc<OnceLock<Weak<dyn ManagedStream>>> = Arc::new(OnceLock::new());
    let sink_owner = owner.clone();
    let sink = FnSink(move |event: StreamEvent| {
        let last = matches!(&event, StreamEvent::ExecutionReport(report) if report.order_id == 2);
        let _ = tx.send(event);
        if last {
            if let Some(connector) = sink_owner.get().and_then(Weak::upgrade) {
                connector.stop();
            }
        }
    });
    let connector: Arc<dyn ManagedStream> = Arc::new(StreamConnector::new(
        user_stream(),
        FakeRest::binance(),
        ws,
        sink,
        &connector_config(),
    ));
    let _ = owner.set(Arc::downgrade(&connector));

    connector.run();
    let session = sessions.recv().await.unwrap();
    for order_id in 1..=3 {
        session.push_text(execution_report(order_id));
    }

    let mut delivered = Vec::new();
    while let Some(StreamEvent::ExecutionReport(report)) = rx.recv().await {
        delivered.push(report.order_id);
    }
    assert_eq!(delivered, vec![1, 2]);
    assert_eq!(connector.current_state(), ConnectionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_bootstrap_cancels_request() {
    let rest = FakeRest::binance().with_delay(Duration::from_secs(60));
    let (ws, _sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector =
        StreamConnector::new(user_stream(), rest.clone(), ws.clone(), tx, &connector_config());
    let mut states = connector.subscribe_state();

    connector.run();
    wait_for_state(&mut states, ConnectionState::Bootstrapping).await;
    connector.stop();
    assert_eq!(connector.current_state(), ConnectionState::Stopped);

    sleep(Duration::from_secs(3600)).await;
    assert!(rest.requests().is_empty());
    assert!(ws.connects().is_empty());
    assert_eq!(connector.current_state(), ConnectionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_prevents_retry() {
    let rest = FakeRest::new(|_, _| {
        Err(HttpFailure::Status {
            status: 503,
            body: "maintenance".into(),
        }
        .into())
    });
    let (ws, _sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(user_stream(), rest.clone(), ws, tx, &connector_config());

    connector.run();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(rest.requests().len(), 1);

    connector.stop();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(rest.requests().len(), 1);
    assert_eq!(connector.current_state(), ConnectionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_failures_retry_with_fixed_backoff() {
    let rest = FakeRest::new(|request, n| {
        if n <= 2 {
            return Err(ExchangeError::Timeout(Stage::Receive));
        }
        match request.method {
            HttpMethod::Post => Ok(r#"{"listenKey":"key-3"}"#.to_string()),
            _ => Ok("{}".to_string()),
        }
    });
    let (ws, mut sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(user_stream(), rest.clone(), ws, tx, &connector_config());

    let start = Instant::now();
    connector.run();
    let session = sessions.recv().await.unwrap();

    let elapsed = Instant::now() - start;
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(15));
    assert_eq!(rest.requests().len(), 3);
    assert!(session.endpoint.as_str().ends_with("/key-3"));
}

#[tokio::test(start_paused = true)]
async fn test_run_and_stop_are_idempotent() {
    let rest = FakeRest::kucoin();
    let (ws, mut sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        KucoinPriceStream::new(KucoinStreamConfig::spot(vec!["BTC-USDT".into()])),
        rest.clone(),
        ws,
        tx,
        &connector_config(),
    );
    let mut states = connector.subscribe_state();

    connector.run();
    connector.run();
    let _session = sessions.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Streaming).await;
    assert_eq!(rest.requests().len(), 1);

    connector.stop();
    connector.stop();
    connector.run();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.current_state(), ConnectionState::Stopped);
    assert_eq!(rest.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_run() {
    let (ws, _sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let rest = FakeRest::binance();
    let connector = StreamConnector::new(user_stream(), rest.clone(), ws, tx, &connector_config());

    assert_eq!(connector.current_state(), ConnectionState::Idle);
    connector.stop();
    connector.run();
    sleep(Duration::from_secs(10)).await;
    assert!(rest.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_connector_stops_it() {
    let (ws, mut sessions) = FakeWs::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let rest = FakeRest::binance();
    let connector: Box<dyn ManagedStream> = Box::new(StreamConnector::new(
        user_stream(),
        rest.clone(),
        ws.clone(),
        tx,
        &connector_config(),
    ));

    connector.run();
    let _session = sessions.recv().await.unwrap();
    drop(connector);

    assert!(rx.recv().await.is_none());
    sleep(Duration::from_secs(3600)).await;
    assert_eq!(ws.connects().len(), 1);
    assert_eq!(rest.count(HttpMethod::Post), 1);
}
