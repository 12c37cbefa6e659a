use anyhow::Context;
use std::env;
use std::sync::Arc;
use streamlink::core::config::ConnectorConfig;
use streamlink::core::traits::FnSink;
use streamlink::{EventSink, ExchangeFactory, ExchangeKind, InstrumentRegistry, StreamEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Usage: `streamlink [kind] [SYMBOL ...]`
///
/// `kind` falls back to `STREAM_KIND` and then `kucoin-spot`; symbols fall
/// back to the comma-separated `STREAM_SYMBOLS`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let kind: ExchangeKind = args
        .next()
        .or_else(|| env::var("STREAM_KIND").ok())
        .unwrap_or_else(|| "kucoin-spot".to_string())
        .parse()?;
    let mut symbols: Vec<String> = args.collect();
    if symbols.is_empty() {
        symbols = env::var("STREAM_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
    }

    let config = ConnectorConfig::from_env().context("invalid connector configuration")?;
    let credentials = ExchangeFactory::credentials_from_env(kind);

    let registry = Arc::new(InstrumentRegistry::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();
    let sink = {
        let registry = registry.clone();
        FnSink(move |event: StreamEvent| {
            registry.deliver(event.clone());
            tx.deliver(event);
        })
    };

    let stream = ExchangeFactory::create_stream(kind, symbols, credentials.as_ref(), &config, sink)
        .with_context(|| format!("failed to create {} stream", kind))?;
    info!(%kind, "Starting stream, press Ctrl-C to stop");
    stream.run();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let header = event.header();
                    info!(
                        exchange = %header.exchange,
                        symbol = %header.symbol,
                        event = ?event,
                        "Event"
                    );
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    stream.stop();
    let stats = stream.stats();
    info!(
        delivered = stats.delivered(),
        malformed = stats.dropped_malformed(),
        unknown = stats.dropped_unknown(),
        instruments = registry.len(),
        "Stream stopped"
    );
    Ok(())
}
