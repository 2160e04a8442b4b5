//! Common capability set every exchange connector implements
//!
//! One implementation per exchange (`binance`, `bitmex`), each normalizing
//! its native payloads into the shared types before they leave the module.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ExchangeResult;
use crate::types::{
    Balance, Candle, Contract, Exchange, OrderRequest, OrderStatus, Quote, Timeframe,
};

#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Contract discovery, called once at startup. Callers treat a failure
    /// as an empty map and keep going.
    async fn list_contracts(&self) -> ExchangeResult<HashMap<String, Contract>>;

    /// Per-asset wallet snapshot, refreshed on demand (never streamed)
    async fn get_balances(&self) -> ExchangeResult<HashMap<String, Balance>>;

    /// Historical candles to backfill the aggregator before live ticks.
    /// Limited to the exchange's page size; rows with missing OHLC fields
    /// are dropped.
    async fn get_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> ExchangeResult<Vec<Candle>>;

    /// REST best bid/ask, used to seed the watchlist before stream quotes
    async fn get_bid_ask(&self, contract: &Contract) -> ExchangeResult<Quote>;

    /// Place an order. Quantity and price are coerced onto the contract's
    /// lot/tick grid before signing; non-aligned input is never rejected.
    async fn place_order(
        &self,
        contract: &Contract,
        request: &OrderRequest,
    ) -> ExchangeResult<OrderStatus>;

    async fn cancel_order(
        &self,
        contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus>;

    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus>;
}
