//! Per-exchange hub tying connector, candles and strategies together
//!
//! The hub owns the shared state the stream dispatch task mutates and the
//! presentation layer polls: best bid/ask per symbol, balance snapshots,
//! strategy instances and the append-only log. Stream events come in through
//! `handle_event`; orders go back out through the connector. Presentation
//! reads are cheap snapshots so polling never blocks the write path for long.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::connector::ExchangeConnector;
use crate::strategy::{CloseReason, Strategy, StrategyAction};
use crate::streams::StreamEvent;
use crate::types::{
    Balance, Contract, LogEntry, OrderRequest, OrderState, Quote, Side, Tick, Trade,
};

pub struct ExchangeHub {
    connector: Arc<dyn ExchangeConnector>,
    contracts: HashMap<String, Contract>,
    prices: RwLock<HashMap<String, Quote>>,
    balances: RwLock<HashMap<String, Balance>>,
    strategies: RwLock<Vec<Strategy>>,
    logs: Mutex<Vec<LogEntry>>,
}

impl ExchangeHub {
    /// Connect to an exchange: discover contracts and snapshot balances.
    /// Either call failing leaves an empty map and a log entry, never an
    /// aborted startup.
    pub async fn connect(connector: Arc<dyn ExchangeConnector>) -> Self {
        let exchange = connector.exchange();
        let contracts = match connector.list_contracts().await {
            Ok(contracts) => {
                info!(%exchange, count = contracts.len(), "contracts loaded");
                contracts
            }
            Err(e) => {
                warn!(%exchange, "contract discovery failed: {e}");
                HashMap::new()
            }
        };
        let balances = match connector.get_balances().await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(%exchange, "balance snapshot unavailable: {e}");
                HashMap::new()
            }
        };
        Self {
            connector,
            contracts,
            prices: RwLock::new(HashMap::new()),
            balances: RwLock::new(balances),
            strategies: RwLock::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn contracts(&self) -> &HashMap<String, Contract> {
        &self.contracts
    }

    pub fn contract(&self, symbol: &str) -> Option<&Contract> {
        self.contracts.get(symbol)
    }

    /// Register a strategy, backfilling its candle series from historical
    /// REST data. A failed backfill is logged; the strategy still starts and
    /// builds its series from live ticks alone.
    pub async fn add_strategy(&self, mut strategy: Strategy) {
        let contract = strategy.contract.clone();
        match self
            .connector
            .get_historical_candles(&contract, strategy.timeframe())
            .await
        {
            Ok(candles) => {
                info!(
                    symbol = %contract.symbol,
                    timeframe = %strategy.timeframe(),
                    count = candles.len(),
                    "candle history backfilled"
                );
                strategy.backfill(candles);
            }
            Err(e) => {
                self.log(format!(
                    "backfill failed for {}, starting from live ticks: {e}",
                    contract.symbol
                ))
                .await;
            }
        }
        self.strategies.write().await.push(strategy);
    }

    /// Dispatch one normalized stream event. Quotes update the watchlist and
    /// drive take-profit/stop-loss; trades feed the candle series and drive
    /// entries.
    pub async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Quote { symbol, bid, ask } => {
                let quote = Quote { bid, ask };
                self.prices.write().await.insert(symbol.clone(), quote);

                let pending = {
                    let mut strategies = self.strategies.write().await;
                    let mut pending = Vec::new();
                    for (idx, strategy) in strategies.iter_mut().enumerate() {
                        if strategy.contract.symbol == symbol {
                            for action in strategy.on_quote(&quote) {
                                pending.push((idx, action));
                            }
                        }
                    }
                    pending
                };
                for (idx, action) in pending {
                    self.execute_action(idx, action).await;
                }
            }
            StreamEvent::Trade {
                symbol,
                price,
                size,
                timestamp,
            } => {
                let tick = Tick {
                    price,
                    size,
                    timestamp,
                };
                let pending = {
                    let mut strategies = self.strategies.write().await;
                    let mut pending = Vec::new();
                    for (idx, strategy) in strategies.iter_mut().enumerate() {
                        if strategy.contract.symbol == symbol {
                            for action in strategy.on_tick(&tick) {
                                pending.push((idx, action));
                            }
                        }
                    }
                    pending
                };
                for (idx, action) in pending {
                    self.execute_action(idx, action).await;
                }
            }
        }
    }

    async fn execute_action(&self, idx: usize, action: StrategyAction) {
        match action {
            StrategyAction::OpenPosition { side } => self.open_position(idx, side).await,
            StrategyAction::ClosePosition { trade_id, reason } => {
                self.close_position(idx, trade_id, reason).await
            }
        }
    }

    async fn open_position(&self, idx: usize, side: Side) {
        let (contract, balance_pct) = {
            let strategies = self.strategies.read().await;
            let Some(strategy) = strategies.get(idx) else {
                return;
            };
            // Queued actions can outrun the bookkeeping; one position at a time
            if strategy.has_open_position() {
                return;
            }
            (strategy.contract.clone(), strategy.balance_pct)
        };

        let Some(price) = self.entry_price(&contract, side).await else {
            self.log(format!(
                "no price available to size entry on {}",
                contract.symbol
            ))
            .await;
            return;
        };
        let Some(quantity) = self.trade_size(&contract, price, balance_pct).await else {
            self.log(format!(
                "no balance available to size entry on {}",
                contract.symbol
            ))
            .await;
            return;
        };
        if quantity <= 0.0 {
            return;
        }

        let request = OrderRequest::market(side, quantity);
        match self.connector.place_order(&contract, &request).await {
            Ok(status) if status.status != OrderState::Rejected => {
                let entry_price = if status.avg_fill_price > 0.0 {
                    status.avg_fill_price
                } else {
                    price
                };
                let mut strategies = self.strategies.write().await;
                if let Some(strategy) = strategies.get_mut(idx) {
                    strategy.record_open(side, entry_price, quantity, status.order_id);
                }
            }
            // The strategy records the rejection in its own log feed, so the
            // hub only traces the exchange detail here
            Ok(status) => {
                warn!(symbol = %contract.symbol, order_id = %status.order_id, "entry order rejected");
                let mut strategies = self.strategies.write().await;
                if let Some(strategy) = strategies.get_mut(idx) {
                    strategy.record_rejection(side, quantity);
                }
            }
            Err(e) => {
                warn!(symbol = %contract.symbol, "entry order failed: {e}");
                let mut strategies = self.strategies.write().await;
                if let Some(strategy) = strategies.get_mut(idx) {
                    strategy.record_rejection(side, quantity);
                }
            }
        }
    }

    async fn close_position(&self, idx: usize, trade_id: uuid::Uuid, reason: CloseReason) {
        let (contract, side, quantity, last_mark) = {
            let strategies = self.strategies.read().await;
            let Some(strategy) = strategies.get(idx) else {
                return;
            };
            let Some(trade) = strategy.trades().iter().find(|t| t.id == trade_id) else {
                return;
            };
            let direction = match trade.side {
                Side::Buy => 1.0,
                Side::Sell => -1.0,
            };
            // Recover the mark that tripped the exit from the running P&L
            let last_mark = if trade.quantity > 0.0 {
                trade.entry_price + direction * trade.pnl / trade.quantity
            } else {
                trade.entry_price
            };
            (strategy.contract.clone(), trade.side, trade.quantity, last_mark)
        };

        let request = OrderRequest::market(side.opposite(), quantity);
        match self.connector.place_order(&contract, &request).await {
            Ok(status) => {
                let exit_price = if status.avg_fill_price > 0.0 {
                    status.avg_fill_price
                } else {
                    // Fill response and book both silent; realizing against a
                    // zero price would record a bogus loss
                    self.entry_price(&contract, side.opposite())
                        .await
                        .unwrap_or(last_mark)
                };
                let mut strategies = self.strategies.write().await;
                if let Some(strategy) = strategies.get_mut(idx) {
                    strategy.record_close(trade_id, exit_price);
                }
                let label = match reason {
                    CloseReason::TakeProfit => "take-profit",
                    CloseReason::StopLoss => "stop-loss",
                };
                self.log(format!("{label} close filled on {}", contract.symbol))
                    .await;
            }
            Err(e) => {
                // Trade stays open; the next quote re-evaluates the exit
                self.log(format!("close order failed on {}: {e}", contract.symbol))
                    .await;
            }
        }
    }

    /// Side-appropriate marketable price from the watchlist, with a REST
    /// fallback before the first stream quote arrives
    async fn entry_price(&self, contract: &Contract, side: Side) -> Option<f64> {
        let quote = match self.prices.read().await.get(&contract.symbol) {
            Some(quote) => *quote,
            None => self.connector.get_bid_ask(contract).await.ok()?,
        };
        let price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };
        (price > 0.0).then_some(price)
    }

    /// Position size from `balance_pct` of current equity. Linear contracts
    /// spend the quote asset; inverse contracts hold margin in the base
    /// asset, so its balance is converted at the current price.
    async fn trade_size(&self, contract: &Contract, price: f64, balance_pct: f64) -> Option<f64> {
        let balances = self.balances.read().await;
        let budget = balances
            .get(&contract.quote_asset)
            .map(|b| b.wallet_balance / price)
            .or_else(|| {
                balances
                    .get(&contract.base_asset)
                    .map(|b| b.wallet_balance * price)
            })?;
        Some(contract.round_quantity(budget * balance_pct / 100.0))
    }

    /// Refresh the balance snapshot from the exchange
    pub async fn refresh_balances(&self) {
        match self.connector.get_balances().await {
            Ok(balances) => *self.balances.write().await = balances,
            Err(e) => warn!(exchange = %self.connector.exchange(), "balance refresh failed: {e}"),
        }
    }

    pub async fn prices_snapshot(&self) -> HashMap<String, Quote> {
        self.prices.read().await.clone()
    }

    pub async fn balances_snapshot(&self) -> HashMap<String, Balance> {
        self.balances.read().await.clone()
    }

    /// All trades across strategies, tagged with their contract symbol
    pub async fn trades_snapshot(&self) -> Vec<(String, Trade)> {
        let strategies = self.strategies.read().await;
        strategies
            .iter()
            .flat_map(|s| {
                s.trades()
                    .iter()
                    .map(|t| (s.contract.symbol.clone(), t.clone()))
            })
            .collect()
    }

    async fn log(&self, message: String) {
        info!(exchange = %self.connector.exchange(), "{message}");
        self.logs.lock().await.push(LogEntry::new(message));
    }

    /// Hub and strategy log entries not yet displayed, flipping their flags
    pub async fn take_new_logs(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .logs
            .lock()
            .await
            .iter_mut()
            .filter(|entry| !entry.displayed)
            .map(|entry| {
                entry.displayed = true;
                entry.message.clone()
            })
            .collect();
        for strategy in self.strategies.write().await.iter_mut() {
            out.extend(strategy.take_new_logs());
        }
        out
    }
}
