pub mod exchange_factory;

pub use exchange_factory::{ExchangeFactory, ExchangeKind};
