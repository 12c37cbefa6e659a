pub mod core;
pub mod exchanges;
pub mod utils;

pub use crate::core::{
    errors::ExchangeError,
    kernel::StreamConnector,
    registry::InstrumentRegistry,
    traits::{EventSink, ManagedStream, StreamProtocol},
    types::*,
};
pub use exchanges::binance::BinanceUserStream;
pub use exchanges::kucoin::KucoinPriceStream;
pub use utils::{ExchangeFactory, ExchangeKind};
