//! BitMEX wire payloads and their mapping onto the normalized model
//!
//! Unlike Binance, BitMEX sends numbers as numbers, timestamps as ISO-8601
//! strings and margin amounts in the smallest unit of the settlement
//! currency (satoshis for XBt).

use chrono::DateTime;
use serde::Deserialize;

use crate::types::{
    decimals_from_step, Balance, Candle, Contract, Exchange, OrderState, OrderStatus, Quote, Side,
};

/// Epoch milliseconds from an ISO-8601 timestamp, `None` when malformed
pub(crate) fn parse_iso_millis(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub symbol: String,
    pub root_symbol: String,
    pub quote_currency: String,
    pub lot_size: f64,
    pub tick_size: f64,
}

impl InstrumentInfo {
    pub fn into_contract(self) -> Contract {
        Contract {
            price_decimals: decimals_from_step(self.tick_size),
            quantity_decimals: decimals_from_step(self.lot_size),
            symbol: self.symbol,
            base_asset: self.root_symbol,
            quote_asset: self.quote_currency,
            tick_size: self.tick_size,
            lot_size: self.lot_size,
            exchange: Exchange::Bitmex,
        }
    }
}

/// One row of `/user/margin?currency=all`. Amounts come in the smallest
/// unit of the currency: 1e-8 XBT for `XBt`, 1e-6 USDT for `USDt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginEntry {
    pub currency: String,
    #[serde(default)]
    pub wallet_balance: i64,
    #[serde(default)]
    pub unrealised_pnl: i64,
}

impl MarginEntry {
    pub fn into_balance(self) -> Balance {
        let (asset, scale) = match self.currency.as_str() {
            "XBt" => ("XBT".to_string(), 1e8),
            "USDt" => ("USDT".to_string(), 1e6),
            other => (other.to_string(), 1.0),
        };
        Balance {
            asset,
            wallet_balance: self.wallet_balance as f64 / scale,
            unrealized_pnl: self.unrealised_pnl as f64 / scale,
        }
    }
}

/// One `/trade/bucketed` row. BitMEX stamps buckets with their close time;
/// empty buckets come back with null OHLC fields.
#[derive(Debug, Deserialize)]
pub struct BucketedCandle {
    pub timestamp: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl BucketedCandle {
    /// Shift the close-time stamp back by one interval so the candle carries
    /// its open time like every other series in the system. Rows with missing
    /// OHLC fields are dropped, not zero-filled.
    pub fn into_candle(self, interval_ms: i64) -> Option<Candle> {
        Some(Candle {
            timestamp: parse_iso_millis(&self.timestamp)? - interval_ms,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
}

impl QuoteResponse {
    pub fn into_quote(self) -> Quote {
        Quote {
            bid: self.bid_price.unwrap_or_default(),
            ask: self.ask_price.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "orderID")]
    pub order_id: String,
    pub ord_status: String,
    pub side: String,
    #[serde(default)]
    pub avg_px: Option<f64>,
    #[serde(default)]
    pub cum_qty: Option<f64>,
}

impl OrderResponse {
    pub fn into_order_status(self) -> OrderStatus {
        let side = if self.side.eq_ignore_ascii_case("Sell") {
            Side::Sell
        } else {
            Side::Buy
        };
        OrderStatus {
            order_id: self.order_id,
            status: OrderState::from_wire(&self.ord_status),
            side,
            avg_fill_price: self.avg_px.unwrap_or_default(),
            filled_quantity: self.cum_qty.unwrap_or_default(),
        }
    }
}

/// Inbound stream rows, wrapped in table-discriminated envelopes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRow {
    pub symbol: String,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TradeRow {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instrument_maps_to_contract() {
        let raw = json!({
            "symbol": "XBTUSD",
            "rootSymbol": "XBT",
            "quoteCurrency": "USD",
            "lotSize": 100.0,
            "tickSize": 0.5,
            "state": "Open"
        });
        let contract = serde_json::from_value::<InstrumentInfo>(raw)
            .unwrap()
            .into_contract();

        assert_eq!(contract.symbol, "XBTUSD");
        assert_eq!(contract.base_asset, "XBT");
        assert_eq!(contract.price_decimals, 1);
        assert_eq!(contract.quantity_decimals, 0);
        assert_eq!(contract.exchange, Exchange::Bitmex);
    }

    #[test]
    fn test_margin_scaled_from_satoshis() {
        let raw = json!({
            "currency": "XBt",
            "walletBalance": 150000000i64,
            "unrealisedPnl": -2500000i64
        });
        let balance = serde_json::from_value::<MarginEntry>(raw)
            .unwrap()
            .into_balance();

        assert_eq!(balance.asset, "XBT");
        assert!((balance.wallet_balance - 1.5).abs() < 1e-12);
        assert!((balance.unrealized_pnl + 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_bucketed_candle_shifted_to_open_time() {
        let raw = json!({
            "timestamp": "2021-07-01T00:01:00.000Z",
            "open": 35000.0,
            "high": 35100.0,
            "low": 34900.0,
            "close": 35050.0,
            "volume": 1234.0
        });
        let candle = serde_json::from_value::<BucketedCandle>(raw)
            .unwrap()
            .into_candle(60_000)
            .unwrap();

        // 00:01 close stamp means the bucket opened at 00:00
        assert_eq!(candle.timestamp, 1625097600000);
        assert_eq!(candle.open, 35000.0);
        assert_eq!(candle.volume, 1234.0);
    }

    #[test]
    fn test_empty_bucket_dropped() {
        let raw = json!({
            "timestamp": "2021-07-01T00:01:00.000Z",
            "open": null,
            "high": null,
            "low": null,
            "close": null,
            "volume": null
        });
        let row = serde_json::from_value::<BucketedCandle>(raw).unwrap();
        assert!(row.into_candle(60_000).is_none());
    }

    #[test]
    fn test_order_response_maps_to_status() {
        let raw = json!({
            "orderID": "a2b3c4d5-0000-1111-2222-333344445555",
            "ordStatus": "PartiallyFilled",
            "side": "Sell",
            "avgPx": 35001.5,
            "cumQty": 50.0,
            "ordType": "Limit"
        });
        let status = serde_json::from_value::<OrderResponse>(raw)
            .unwrap()
            .into_order_status();

        assert_eq!(status.order_id, "a2b3c4d5-0000-1111-2222-333344445555");
        assert_eq!(status.status, OrderState::PartiallyFilled);
        assert_eq!(status.side, Side::Sell);
        assert_eq!(status.avg_fill_price, 35001.5);
        assert_eq!(status.filled_quantity, 50.0);
    }

    #[test]
    fn test_parse_iso_millis() {
        assert_eq!(
            parse_iso_millis("2021-07-01T00:00:00.000Z"),
            Some(1625097600000)
        );
        assert_eq!(parse_iso_millis("not a timestamp"), None);
    }
}
