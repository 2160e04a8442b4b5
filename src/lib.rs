//! Live derivatives trading core: signed REST connectors for Binance futures
//! and BitMEX, resilient websocket market data streams, tick-to-candle
//! aggregation and candle-driven trading strategies, tied together by a
//! per-exchange hub the presentation layer polls.

pub mod app;
pub mod binance;
pub mod bitmex;
pub mod candles;
pub mod connector;
pub mod error;
pub mod strategy;
pub mod streams;
pub mod transport;
pub mod types;

pub use app::ExchangeHub;
pub use binance::BinanceFuturesClient;
pub use bitmex::BitmexClient;
pub use candles::CandleSeries;
pub use connector::ExchangeConnector;
pub use error::{ExchangeError, ExchangeResult};
pub use strategy::{BreakoutParams, Strategy, StrategyKind, TechnicalParams};
pub use streams::{StreamConnection, StreamEvent, StreamHandle, StreamSpec};
