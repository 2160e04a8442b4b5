//! Binance websocket stream spec
//!
//! Outbound control frames follow the `SUBSCRIBE` method shape with an
//! incrementing request id; inbound frames are discriminated by the `e`
//! event-type field. Only book-ticker and aggregated-trade events are
//! recognized, everything else is ignored.

use serde_json::{json, Value};

use super::models::{parse_num, AggTradeEvent, BookTickerEvent};
use crate::streams::{ChannelSubscription, StreamEvent, StreamSpec};
use crate::types::Exchange;

pub const BOOK_TICKER_CHANNEL: &str = "bookTicker";
pub const AGG_TRADE_CHANNEL: &str = "aggTrade";

pub struct BinanceStreamSpec {
    ws_url: String,
}

impl BinanceStreamSpec {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

impl StreamSpec for BinanceStreamSpec {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn ws_url(&self) -> String {
        self.ws_url.clone()
    }

    fn quote_channel(&self) -> &'static str {
        BOOK_TICKER_CHANNEL
    }

    fn trade_channel(&self) -> &'static str {
        AGG_TRADE_CHANNEL
    }

    fn subscribe_message(&self, subscription: &ChannelSubscription, request_id: u64) -> String {
        let params: Vec<String> = subscription
            .symbols
            .iter()
            .map(|symbol| format!("{}@{}", symbol.to_lowercase(), subscription.channel))
            .collect();
        json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": request_id,
        })
        .to_string()
    }

    fn parse_message(&self, raw: &str) -> Vec<StreamEvent> {
        parse_event(raw).into_iter().collect()
    }
}

fn parse_event(raw: &str) -> Option<StreamEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    match value.get("e")?.as_str()? {
        "bookTicker" => {
            let event: BookTickerEvent = serde_json::from_value(value).ok()?;
            Some(StreamEvent::Quote {
                symbol: event.s,
                bid: parse_num(&event.b),
                ask: parse_num(&event.a),
            })
        }
        "aggTrade" => {
            let event: AggTradeEvent = serde_json::from_value(value).ok()?;
            Some(StreamEvent::Trade {
                symbol: event.s,
                price: parse_num(&event.p),
                size: parse_num(&event.q),
                timestamp: event.timestamp,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BinanceStreamSpec {
        BinanceStreamSpec::new("wss://stream.binancefuture.com/ws".to_string())
    }

    #[test]
    fn test_subscribe_message_shape() {
        let subscription = ChannelSubscription {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            channel: BOOK_TICKER_CHANNEL.to_string(),
        };
        let msg = spec().subscribe_message(&subscription, 7);
        let value: Value = serde_json::from_str(&msg).unwrap();

        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"][0], "btcusdt@bookTicker");
        assert_eq!(value["params"][1], "ethusdt@bookTicker");
    }

    #[test]
    fn test_parse_book_ticker_event() {
        let raw = r#"{"e":"bookTicker","u":400900217,"s":"BTCUSDT","b":"25.35190000","B":"31.21","a":"25.36520000","A":"40.66"}"#;
        let events = spec().parse_message(raw);
        assert_eq!(
            events,
            vec![StreamEvent::Quote {
                symbol: "BTCUSDT".to_string(),
                bid: 25.3519,
                ask: 25.3652,
            }]
        );
    }

    #[test]
    fn test_parse_agg_trade_event() {
        let raw = r#"{"e":"aggTrade","E":123456789,"s":"BTCUSDT","a":5933014,"p":"35001.5","q":"0.021","f":100,"l":105,"T":123456785,"m":true}"#;
        let events = spec().parse_message(raw);
        assert_eq!(
            events,
            vec![StreamEvent::Trade {
                symbol: "BTCUSDT".to_string(),
                price: 35001.5,
                size: 0.021,
                timestamp: 123456785,
            }]
        );
    }

    #[test]
    fn test_unrecognized_events_ignored() {
        assert!(spec().parse_message(r#"{"e":"markPrice","s":"BTCUSDT"}"#).is_empty());
        assert!(spec().parse_message(r#"{"result":null,"id":1}"#).is_empty());
        assert!(spec().parse_message("not json").is_empty());
    }
}
