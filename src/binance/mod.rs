//! Binance USDⓈ-M futures connector

mod client;
mod models;
mod stream;

pub use client::BinanceFuturesClient;
pub use stream::BinanceStreamSpec;
