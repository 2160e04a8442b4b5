//! Live market data streaming
//!
//! Each exchange provides a `StreamSpec` describing its websocket endpoint,
//! subscription control messages and inbound message classification. The
//! generic `StreamConnection` drives the connect/reconnect state machine and
//! pushes normalized events to the dispatch task.

mod connection;

pub use connection::{StreamConnection, StreamHandle, StreamState};

use crate::types::Exchange;

/// Normalized inbound stream event. Unrecognized message types never make it
/// out of the exchange-specific parser.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Best bid/ask update for a symbol
    Quote {
        symbol: String,
        bid: f64,
        ask: f64,
    },
    /// Aggregated trade event
    Trade {
        symbol: String,
        price: f64,
        size: f64,
        timestamp: i64,
    },
}

/// A registered channel subscription, re-issued on every (re)connect
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSubscription {
    pub symbols: Vec<String>,
    pub channel: String,
}

/// Exchange-specific half of the stream connection
pub trait StreamSpec: Send + Sync + 'static {
    fn exchange(&self) -> Exchange;

    /// Websocket endpoint URL
    fn ws_url(&self) -> String;

    /// Channel name carrying best bid/ask updates
    fn quote_channel(&self) -> &'static str;

    /// Channel name carrying aggregated trade events
    fn trade_channel(&self) -> &'static str;

    /// Outbound subscription control message for one channel. `request_id`
    /// increases monotonically per call and never resets across reconnects.
    fn subscribe_message(&self, subscription: &ChannelSubscription, request_id: u64) -> String;

    /// Classify one inbound frame. A frame can carry several data rows;
    /// unrecognized frames produce nothing.
    fn parse_message(&self, raw: &str) -> Vec<StreamEvent>;
}
