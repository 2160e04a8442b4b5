//! BitMEX websocket stream spec
//!
//! Outbound control frames use the `{"op":"subscribe","args":[...]}` shape
//! with `channel:SYMBOL` arguments; BitMEX has no per-request ids. Inbound
//! data frames are table-discriminated envelopes whose `data` array can carry
//! several rows per frame.

use serde_json::{json, Value};

use super::models::{parse_iso_millis, QuoteRow, TradeRow};
use crate::streams::{ChannelSubscription, StreamEvent, StreamSpec};
use crate::types::Exchange;

pub const QUOTE_CHANNEL: &str = "quote";
pub const TRADE_CHANNEL: &str = "trade";

pub struct BitmexStreamSpec {
    ws_url: String,
}

impl BitmexStreamSpec {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

impl StreamSpec for BitmexStreamSpec {
    fn exchange(&self) -> Exchange {
        Exchange::Bitmex
    }

    fn ws_url(&self) -> String {
        self.ws_url.clone()
    }

    fn quote_channel(&self) -> &'static str {
        QUOTE_CHANNEL
    }

    fn trade_channel(&self) -> &'static str {
        TRADE_CHANNEL
    }

    fn subscribe_message(&self, subscription: &ChannelSubscription, _request_id: u64) -> String {
        let args: Vec<String> = subscription
            .symbols
            .iter()
            .map(|symbol| format!("{}:{}", subscription.channel, symbol))
            .collect();
        json!({
            "op": "subscribe",
            "args": args,
        })
        .to_string()
    }

    fn parse_message(&self, raw: &str) -> Vec<StreamEvent> {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return Vec::new();
        };
        let Some(table) = value.get("table").and_then(Value::as_str) else {
            return Vec::new();
        };
        let Some(data) = value.get("data").and_then(Value::as_array) else {
            return Vec::new();
        };

        match table {
            QUOTE_CHANNEL => data
                .iter()
                .filter_map(|row| {
                    let row: QuoteRow = serde_json::from_value(row.clone()).ok()?;
                    Some(StreamEvent::Quote {
                        symbol: row.symbol,
                        bid: row.bid_price?,
                        ask: row.ask_price?,
                    })
                })
                .collect(),
            TRADE_CHANNEL => data
                .iter()
                .filter_map(|row| {
                    let row: TradeRow = serde_json::from_value(row.clone()).ok()?;
                    Some(StreamEvent::Trade {
                        symbol: row.symbol,
                        price: row.price,
                        size: row.size,
                        timestamp: parse_iso_millis(&row.timestamp)?,
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
