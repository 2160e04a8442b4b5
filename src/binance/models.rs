//! Binance futures wire payloads and their mapping onto the normalized model
//!
//! Binance sends most numbers as strings; parsing failures degrade to zero
//! the way the exchange's own "0.00000" placeholders do.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{
    Balance, Candle, Contract, Exchange, OrderState, OrderStatus, Quote, Side,
};

pub(crate) fn parse_num(raw: &str) -> f64 {
    raw.parse().unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

impl SymbolInfo {
    pub fn into_contract(self) -> Contract {
        let tick_size = 10f64.powi(-(self.price_precision as i32));
        let lot_size = 10f64.powi(-(self.quantity_precision as i32));
        Contract {
            symbol: self.symbol,
            base_asset: self.base_asset,
            quote_asset: self.quote_asset,
            price_decimals: self.price_precision,
            quantity_decimals: self.quantity_precision,
            tick_size,
            lot_size,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub assets: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    pub wallet_balance: String,
    pub unrealized_profit: String,
}

impl AssetBalance {
    pub fn into_balance(self) -> Balance {
        Balance {
            wallet_balance: parse_num(&self.wallet_balance),
            unrealized_pnl: parse_num(&self.unrealized_profit),
            asset: self.asset,
        }
    }
}

/// Klines come back as positional arrays:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`.
/// Rows missing any OHLC field are dropped, not zero-filled.
pub fn candle_from_kline(row: &Value) -> Option<Candle> {
    let row = row.as_array()?;
    if row.len() < 6 {
        return None;
    }
    Some(Candle {
        timestamp: row[0].as_i64()?,
        open: row[1].as_str()?.parse().ok()?,
        high: row[2].as_str()?.parse().ok()?,
        low: row[3].as_str()?.parse().ok()?,
        close: row[4].as_str()?.parse().ok()?,
        volume: row[5].as_str()?.parse().ok()?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTickerResponse {
    pub bid_price: String,
    pub ask_price: String,
}

impl BookTickerResponse {
    pub fn into_quote(self) -> Quote {
        Quote {
            bid: parse_num(&self.bid_price),
            ask: parse_num(&self.ask_price),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub status: String,
    pub side: String,
    #[serde(default)]
    pub avg_price: Option<String>,
    #[serde(default)]
    pub executed_qty: Option<String>,
}

impl OrderResponse {
    pub fn into_order_status(self) -> OrderStatus {
        let side = if self.side.eq_ignore_ascii_case("SELL") {
            Side::Sell
        } else {
            Side::Buy
        };
        OrderStatus {
            order_id: self.order_id.to_string(),
            status: OrderState::from_wire(&self.status),
            side,
            avg_fill_price: self.avg_price.as_deref().map(parse_num).unwrap_or_default(),
            filled_quantity: self
                .executed_qty
                .as_deref()
                .map(parse_num)
                .unwrap_or_default(),
        }
    }
}

/// Inbound stream events, discriminated by the `e` field
#[derive(Debug, Deserialize)]
pub struct BookTickerEvent {
    pub s: String,
    pub b: String,
    pub a: String,
}

#[derive(Debug, Deserialize)]
pub struct AggTradeEvent {
    pub s: String,
    pub p: String,
    pub q: String,
    #[serde(rename = "T")]
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbol_info_maps_to_contract() {
        let raw = json!({
            "symbol": "BTCUSDT",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "pricePrecision": 2,
            "quantityPrecision": 3,
            "contractType": "PERPETUAL"
        });
        let info: SymbolInfo = serde_json::from_value(raw).unwrap();
        let contract = info.into_contract();

        assert_eq!(contract.symbol, "BTCUSDT");
        assert_eq!(contract.price_decimals, 2);
        assert!((contract.tick_size - 0.01).abs() < 1e-12);
        assert!((contract.lot_size - 0.001).abs() < 1e-12);
        assert_eq!(contract.exchange, Exchange::Binance);
    }

    #[test]
    fn test_contract_mapping_is_idempotent() {
        let raw = json!({
            "symbol": "ETHUSDT",
            "baseAsset": "ETH",
            "quoteAsset": "USDT",
            "pricePrecision": 2,
            "quantityPrecision": 3
        });
        let a: SymbolInfo = serde_json::from_value(raw.clone()).unwrap();
        let b: SymbolInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(a.into_contract(), b.into_contract());
    }

    #[test]
    fn test_candle_from_kline_row() {
        let row = json!([1625097600000i64, "35000.1", "35100.0", "34900.5", "35050.2", "123.45", 1625097899999i64]);
        let candle = candle_from_kline(&row).unwrap();
        assert_eq!(candle.timestamp, 1625097600000);
        assert_eq!(candle.open, 35000.1);
        assert_eq!(candle.close, 35050.2);
        assert_eq!(candle.volume, 123.45);
    }

    #[test]
    fn test_kline_with_missing_fields_dropped() {
        let row = json!([1625097600000i64, "35000.1", "35100.0"]);
        assert!(candle_from_kline(&row).is_none());
        let row = json!([1625097600000i64, null, "35100.0", "34900.5", "35050.2", "1.0"]);
        assert!(candle_from_kline(&row).is_none());
    }

    #[test]
    fn test_order_response_maps_to_status() {
        let raw = json!({
            "orderId": 4055629553i64,
            "status": "PARTIALLY_FILLED",
            "side": "SELL",
            "avgPrice": "35001.5",
            "executedQty": "0.5",
            "clientOrderId": "x"
        });
        let status: OrderStatus =
            serde_json::from_value::<OrderResponse>(raw).unwrap().into_order_status();
        assert_eq!(status.order_id, "4055629553");
        assert_eq!(status.status, OrderState::PartiallyFilled);
        assert_eq!(status.side, Side::Sell);
        assert_eq!(status.avg_fill_price, 35001.5);
        assert_eq!(status.filled_quantity, 0.5);
    }

    #[test]
    fn test_balance_parses_string_amounts() {
        let raw = json!({
            "asset": "USDT",
            "walletBalance": "2500.75",
            "unrealizedProfit": "-12.5"
        });
        let balance = serde_json::from_value::<AssetBalance>(raw)
            .unwrap()
            .into_balance();
        assert_eq!(balance.asset, "USDT");
        assert_eq!(balance.wallet_balance, 2500.75);
        assert_eq!(balance.unrealized_pnl, -12.5);
    }
}
