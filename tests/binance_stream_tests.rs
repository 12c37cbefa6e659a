mod common;

use common::{
    binance_credentials, connector_config, execution_report, wait_for_state, FakeRest, FakeWs,
};
use std::time::Duration;
use streamlink::core::kernel::{HttpMethod, StreamConnector};
use streamlink::exchanges::binance::{BinanceUserConfig, BinanceUserStream};
use streamlink::{ConnectionState, StreamEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

fn user_stream(config: BinanceUserConfig) -> BinanceUserStream {
    BinanceUserStream::new(&binance_credentials(), config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_events_delivered_in_order() {
    let rest = FakeRest::binance();
    let (ws, mut sessions) = FakeWs::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        user_stream(BinanceUserConfig::default()),
        rest,
        ws.clone(),
        tx,
        &connector_config(),
    );
    let mut states = connector.subscribe_state();

    connector.run();
    let session = sessions.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Streaming).await;
    assert_eq!(session.endpoint.as_str(), "wss://stream.binance.com:9443/ws/key-1");
    assert!(session.sent().is_empty(), "user stream sends no subscription");

    session.push_text(execution_report(1));
    session.push_text(r#"{"e":"listStatus","E":1700000000000}"#);
    session.push_text(execution_report(2));
    session.push_text("{this is not json");
    session.push_text(execution_report(3));

    for expected in 1..=3 {
        match rx.recv().await.unwrap() {
            StreamEvent::ExecutionReport(report) => {
                assert_eq!(report.order_id, expected);
                assert_eq!(report.header.symbol, "BTCUSDT");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(connector.current_state(), ConnectionState::Streaming);
    let stats = connector.stats();
    assert_eq!(stats.delivered(), 3);
    assert_eq!(stats.dropped_unknown(), 1);
    assert_eq!(stats.dropped_malformed(), 1);
    assert_eq!(ws.connects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listen_key_renewed_before_expiry() {
    let rest = FakeRest::binance();
    let (ws, mut sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let config = BinanceUserConfig::default()
        .with_renewal_interval(Duration::from_secs(29 * 60))
        .with_listen_key_validity(Duration::from_secs(30 * 60));
    let connector = StreamConnector::new(
        user_stream(config),
        rest.clone(),
        ws.clone(),
        tx,
        &connector_config(),
    );
    let mut states = connector.subscribe_state();

    connector.run();
    let _session = sessions.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Streaming).await;

    sleep(Duration::from_secs(29 * 60 + 1)).await;
    let renewals: Vec<_> = rest
        .requests()
        .into_iter()
        .filter(|r| r.method == HttpMethod::Put)
        .collect();
    assert_eq!(renewals.len(), 1);
    assert_eq!(renewals[0].target, "/api/v3/userDataStream?listenKey=key-1");

    // Past the original 30 minute expiry; the renewed key keeps the session
    sleep(Duration::from_secs(29 * 60)).await;
    assert_eq!(rest.count(HttpMethod::Put), 2);
    assert_eq!(rest.count(HttpMethod::Post), 1);
    assert_eq!(ws.connects().len(), 1);
    assert_eq!(connector.current_state(), ConnectionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewals_reconnect_at_expiry() {
    let rest = FakeRest::binance_with_failed_renewals(usize::MAX);
    let (ws, mut sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let config = BinanceUserConfig::default()
        .with_renewal_interval(Duration::from_secs(20 * 60))
        .with_renewal_retry(Duration::from_secs(5 * 60))
        .with_listen_key_validity(Duration::from_secs(30 * 60));
    let connector = StreamConnector::new(
        user_stream(config),
        rest.clone(),
        ws.clone(),
        tx,
        &connector_config(),
    );

    let start = Instant::now();
    connector.run();
    let first = sessions.recv().await.unwrap();

    let second = sessions.recv().await.unwrap();
    let elapsed = Instant::now() - start;
    assert!(elapsed >= Duration::from_secs(30 * 60 + 5), "reconnected after {:?}", elapsed);
    assert!(first.is_closed());
    // Renewal at 20 minutes, retry at 25; the retry due at 30 loses to expiry
    assert_eq!(rest.count(HttpMethod::Put), 2);
    assert_eq!(rest.count(HttpMethod::Post), 2);
    assert_eq!(second.endpoint.as_str(), "wss://stream.binance.com:9443/ws/key-2");
}

#[tokio::test(start_paused = true)]
async fn test_rejected_renewal_retried_before_expiry() {
    let rest = FakeRest::binance_with_failed_renewals(1);
    let (ws, mut sessions) = FakeWs::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        user_stream(BinanceUserConfig::default()),
        rest.clone(),
        ws.clone(),
        tx,
        &connector_config(),
    );
    let mut states = connector.subscribe_state();

    connector.run();
    let _session = sessions.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Streaming).await;

    sleep(Duration::from_secs(30 * 60 + 1)).await;
    assert_eq!(rest.count(HttpMethod::Put), 1);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(rest.count(HttpMethod::Put), 2);

    // Past the hour the first key would have lived without the retry
    sleep(Duration::from_secs(31 * 60)).await;
    assert_eq!(rest.count(HttpMethod::Put), 3);
    assert_eq!(rest.count(HttpMethod::Post), 1);
    assert_eq!(ws.connects().len(), 1);
    assert_eq!(connector.current_state(), ConnectionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_failure_discards_listen_key() {
    let rest = FakeRest::binance();
    let (ws, mut sessions) = FakeWs::new();
    ws.fail_next(1);
    let (tx, _rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        user_stream(BinanceUserConfig::default()),
        rest.clone(),
        ws.clone(),
        tx,
        &connector_config(),
    );

    let start = Instant::now();
    connector.run();
    let session = sessions.recv().await.unwrap();

    assert!(Instant::now() - start >= Duration::from_secs(5));
    let connects = ws.connects();
    assert_eq!(connects.len(), 2);
    assert!(connects[0].as_str().ends_with("/key-1"));
    assert!(connects[1].as_str().ends_with("/key-2"));
    assert_eq!(session.endpoint, connects[1]);
    assert_eq!(rest.count(HttpMethod::Post), 2);
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_triggers_fresh_bootstrap() {
    let rest = FakeRest::binance();
    let (ws, mut sessions) = FakeWs::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector = StreamConnector::new(
        user_stream(BinanceUserConfig::default()),
        rest.clone(),
        ws,
        tx,
        &connector_config(),
    );

    connector.run();
    let first = sessions.recv().await.unwrap();
    first.push_text(execution_report(7));
    assert!(matches!(rx.recv().await, Some(StreamEvent::ExecutionReport(_))));
    drop(first);

    let second = sessions.recv().await.unwrap();
    assert!(second.endpoint.as_str().ends_with("/key-2"));
    second.push_text(execution_report(8));
    match rx.recv().await.unwrap() {
        StreamEvent::ExecutionReport(report) => assert_eq!(report.order_id, 8),
        other => panic!("unexpected event {:?}", other),
    }
}
