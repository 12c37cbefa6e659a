use crate::core::traits::EventSink;
use crate::core::types::{ExchangeId, StreamEvent, TickerUpdate, TradeType};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstrumentKey {
    exchange: ExchangeId,
    trade_type: TradeType,
    symbol: String,
}

/// Latest ticker per instrument, shared by every price connector
///
/// Writers are connector tasks, readers are whatever consumes prices. Only
/// `TickerUpdate` events are recorded; user-data events pass through
/// untouched.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    tickers: RwLock<HashMap<InstrumentKey, TickerUpdate>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(
        &self,
        exchange: ExchangeId,
        trade_type: TradeType,
        symbol: &str,
    ) -> Option<TickerUpdate> {
        let key = InstrumentKey {
            exchange,
            trade_type,
            symbol: symbol.to_string(),
        };
        self.tickers.read().get(&key).cloned()
    }

    /// Copy of every tracked ticker, ordered by exchange then symbol
    pub fn snapshot(&self) -> Vec<TickerUpdate> {
        let mut tickers: Vec<TickerUpdate> = self.tickers.read().values().cloned().collect();
        tickers.sort_by(|a, b| {
            (a.header.exchange, &a.header.symbol, a.trade_type).cmp(&(
                b.header.exchange,
                &b.header.symbol,
                b.trade_type,
            ))
        });
        tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.read().is_empty()
    }

    fn record(&self, ticker: TickerUpdate) {
        let key = InstrumentKey {
            exchange: ticker.header.exchange,
            trade_type: ticker.trade_type,
            symbol: ticker.header.symbol.clone(),
        };
        let mut tickers = self.tickers.write();
        match tickers.get(&key) {
            // Out-of-order frames across reconnects must not roll prices back
            Some(current) if current.header.timestamp > ticker.header.timestamp => {}
            _ => {
                tickers.insert(key, ticker);
            }
        }
    }
}

impl EventSink for InstrumentRegistry {
    fn deliver(&self, event: StreamEvent) {
        if let StreamEvent::TickerUpdate(ticker) = event {
            self.record(ticker);
        }
    }
}
