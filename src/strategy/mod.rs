//! Strategy engine
//!
//! A `Strategy` is bound to one (contract, timeframe) for the process
//! lifetime. It owns its candle series and open trades, evaluates its signal
//! on every completed candle and checks take-profit / stop-loss on every
//! quote. Evaluation is synchronous and returns actions; order execution
//! happens in the hub so a rejected order never stalls other strategies.

mod breakout;
mod technical;

pub use breakout::BreakoutParams;
pub use technical::TechnicalParams;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::candles::CandleSeries;
use crate::types::{
    Candle, Contract, LogEntry, Quote, Side, Tick, Timeframe, Trade, TradeStatus,
};

/// Directional signal from one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Neutral,
}

/// Reason an open trade is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
}

/// What the hub should do on the strategy's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyAction {
    OpenPosition { side: Side },
    ClosePosition { trade_id: Uuid, reason: CloseReason },
}

/// Strategy variant and its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Technical(TechnicalParams),
    Breakout(BreakoutParams),
}

impl StrategyKind {
    /// Single evaluation entry point over the closed candle history
    pub fn evaluate(&self, closed: &[Candle]) -> Signal {
        match self {
            Self::Technical(params) => params.evaluate(closed),
            Self::Breakout(params) => params.evaluate(closed),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Technical(_) => "technical",
            Self::Breakout(_) => "breakout",
        }
    }
}

pub struct Strategy {
    pub contract: Contract,
    kind: StrategyKind,
    /// Percent of wallet balance committed per entry
    pub balance_pct: f64,
    /// Take-profit threshold in percent of entry price
    pub take_profit: f64,
    /// Stop-loss threshold in percent of entry price
    pub stop_loss: f64,
    candles: CandleSeries,
    trades: Vec<Trade>,
    logs: Vec<LogEntry>,
    ongoing_position: bool,
}

impl Strategy {
    pub fn new(
        contract: Contract,
        timeframe: Timeframe,
        kind: StrategyKind,
        balance_pct: f64,
        take_profit: f64,
        stop_loss: f64,
    ) -> Self {
        Self {
            contract,
            kind,
            balance_pct,
            take_profit,
            stop_loss,
            candles: CandleSeries::new(timeframe),
            trades: Vec::new(),
            logs: Vec::new(),
            ongoing_position: false,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.candles.timeframe()
    }

    pub fn kind(&self) -> &StrategyKind {
        &self.kind
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Seed the candle series from historical REST data before live ticks
    pub fn backfill(&mut self, candles: Vec<Candle>) {
        self.candles.backfill(candles);
    }

    /// Fold a trade tick into the candle series and evaluate the signal if it
    /// completed any candle. A gap tick can complete several candles at once,
    /// but the indicators only depend on the final closed history, so one
    /// evaluation decides at most one entry.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<StrategyAction> {
        let completed = self.candles.update(tick);
        if completed.is_empty() || self.ongoing_position {
            return Vec::new();
        }
        match self.kind.evaluate(self.candles.closed()) {
            Signal::Neutral => Vec::new(),
            Signal::Long => vec![StrategyAction::OpenPosition { side: Side::Buy }],
            Signal::Short => vec![StrategyAction::OpenPosition { side: Side::Sell }],
        }
    }

    /// Mark open trades to market and check take-profit / stop-loss. Longs
    /// exit on the bid, shorts on the ask.
    pub fn on_quote(&mut self, quote: &Quote) -> Vec<StrategyAction> {
        let mut actions = Vec::new();
        for trade in self.trades.iter_mut().filter(|t| t.status == TradeStatus::Open) {
            let mark = match trade.side {
                Side::Buy => quote.bid,
                Side::Sell => quote.ask,
            };
            if mark <= 0.0 || trade.entry_price <= 0.0 {
                continue;
            }
            let direction = match trade.side {
                Side::Buy => 1.0,
                Side::Sell => -1.0,
            };
            trade.pnl = (mark - trade.entry_price) * trade.quantity * direction;

            let move_pct = (mark - trade.entry_price) / trade.entry_price * 100.0 * direction;
            if self.take_profit > 0.0 && move_pct >= self.take_profit {
                actions.push(StrategyAction::ClosePosition {
                    trade_id: trade.id,
                    reason: CloseReason::TakeProfit,
                });
            } else if self.stop_loss > 0.0 && move_pct <= -self.stop_loss {
                actions.push(StrategyAction::ClosePosition {
                    trade_id: trade.id,
                    reason: CloseReason::StopLoss,
                });
            }
        }
        actions
    }

    /// Record an accepted entry order as an open trade
    pub fn record_open(
        &mut self,
        side: Side,
        entry_price: f64,
        quantity: f64,
        order_id: String,
    ) -> Uuid {
        let trade = Trade {
            id: Uuid::new_v4(),
            time: Utc::now(),
            side,
            entry_price,
            quantity,
            status: TradeStatus::Open,
            pnl: 0.0,
            entry_order_id: Some(order_id),
        };
        let id = trade.id;
        self.ongoing_position = true;
        self.log(format!(
            "{} {} position opened on {} at {}",
            self.kind.label(),
            side,
            self.contract.symbol,
            entry_price
        ));
        self.trades.push(trade);
        id
    }

    /// Record a rejected entry order; never crashes the evaluation loop
    pub fn record_rejection(&mut self, side: Side, quantity: f64) {
        self.trades.push(Trade {
            id: Uuid::new_v4(),
            time: Utc::now(),
            side,
            entry_price: 0.0,
            quantity,
            status: TradeStatus::Rejected,
            pnl: 0.0,
            entry_order_id: None,
        });
        self.log(format!(
            "{} entry order rejected on {}",
            self.kind.label(),
            self.contract.symbol
        ));
    }

    /// Realize a trade's P&L at the exit price and release the position slot
    pub fn record_close(&mut self, trade_id: Uuid, exit_price: f64) {
        let symbol = self.contract.symbol.clone();
        let label = self.kind.label();
        let mut closed = None;
        if let Some(trade) = self.trades.iter_mut().find(|t| t.id == trade_id) {
            let direction = match trade.side {
                Side::Buy => 1.0,
                Side::Sell => -1.0,
            };
            trade.pnl = (exit_price - trade.entry_price) * trade.quantity * direction;
            trade.status = TradeStatus::Closed;
            closed = Some(trade.pnl);
        }
        if let Some(pnl) = closed {
            self.ongoing_position = false;
            self.log(format!(
                "{label} position closed on {symbol} at {exit_price} (pnl {pnl:.2})"
            ));
        }
    }

    pub fn has_open_position(&self) -> bool {
        self.ongoing_position
    }

    fn log(&mut self, message: String) {
        info!(symbol = %self.contract.symbol, "{message}");
        self.logs.push(LogEntry::new(message));
    }

    /// Hand out log entries not yet displayed, flipping their flag
    pub fn take_new_logs(&mut self) -> Vec<String> {
        self.logs
            .iter_mut()
            .filter(|entry| !entry.displayed)
            .map(|entry| {
                entry.displayed = true;
                entry.message.clone()
            })
            .collect()
    }
}
