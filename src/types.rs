//! Normalized data model shared across exchanges
//!
//! Exchange payloads are mapped into these shapes as early as possible so the
//! aggregator, strategies and presentation layer never see raw wire formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Supported exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Binance,
    Bitmex,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Bitmex => write!(f, "bitmex"),
        }
    }
}

/// Tradable contract metadata, immutable once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    /// Minimum price increment
    pub tick_size: f64,
    /// Minimum quantity increment
    pub lot_size: f64,
    pub exchange: Exchange,
}

impl Contract {
    /// Coerce a price onto the contract's tick grid (half away from zero)
    pub fn round_price(&self, price: f64) -> f64 {
        round_to_step(price, self.tick_size)
    }

    /// Coerce a quantity onto the contract's lot grid (half away from zero)
    pub fn round_quantity(&self, quantity: f64) -> f64 {
        round_to_step(quantity, self.lot_size)
    }

    /// Price formatted with the contract's decimal places for wire params
    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_decimals as usize, price)
    }

    /// Quantity formatted with the contract's decimal places for wire params
    pub fn format_quantity(&self, quantity: f64) -> String {
        format!("{:.*}", self.quantity_decimals as usize, quantity)
    }
}

fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Number of decimal places implied by a tick/lot step like 0.01
pub fn decimals_from_step(step: f64) -> u32 {
    if step <= 0.0 {
        return 0;
    }
    let mut decimals = 0u32;
    let mut s = step;
    while s < 0.999_999 && decimals < 12 {
        s *= 10.0;
        decimals += 1;
    }
    decimals
}

/// Fixed-interval OHLCV candle. `timestamp` is the interval start in epoch ms,
/// aligned to the timeframe boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single trade event from the stream, not retained after candle folding
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    pub size: f64,
    pub timestamp: i64,
}

/// Best bid/ask for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

/// Per-asset wallet snapshot, refreshed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub wallet_balance: f64,
    pub unrealized_pnl: f64,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
        }
    }
}

/// Order lifecycle state as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Unknown,
}

impl OrderState {
    /// Map an exchange status string onto the normalized enum.
    /// Unrecognized statuses become `Unknown` rather than an error.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "NEW" => Self::New,
            "PARTIALLY_FILLED" | "PARTIALLYFILLED" => Self::PartiallyFilled,
            "FILLED" => Self::Filled,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            "REJECTED" => Self::Rejected,
            _ => Self::Unknown,
        }
    }
}

/// Normalized order snapshot, created on placement and updated by polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub status: OrderState,
    pub side: Side,
    pub avg_fill_price: f64,
    pub filled_quantity: f64,
}

/// Parameters for placing an order through a connector
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn market(side: Side, quantity: f64) -> Self {
        Self {
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            time_in_force: None,
        }
    }

    pub fn limit(side: Side, quantity: f64, price: f64, tif: TimeInForce) -> Self {
        Self {
            side,
            quantity,
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: Some(tif),
        }
    }
}

/// Candle timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    /// Interval length in milliseconds
    pub fn as_millis(&self) -> i64 {
        match self {
            Self::M1 => 60_000,
            Self::M5 => 300_000,
            Self::M15 => 900_000,
            Self::M30 => 1_800_000,
            Self::H1 => 3_600_000,
            Self::H4 => 14_400_000,
        }
    }

    /// Wire label used by exchange candle endpoints
    pub fn label(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Lifecycle of a strategy-originated position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
    Rejected,
}

/// One strategy-originated position with mark-to-market P&L
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub status: TradeStatus,
    /// Unrealized while open, realized once closed
    pub pnl: f64,
    /// Exchange order id of the entry order, if it was accepted
    pub entry_order_id: Option<String>,
}

/// Append-only log entry for the polling presentation layer.
/// `displayed` flips to true once the entry has been handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub displayed: bool,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            displayed: false,
        }
    }
}
