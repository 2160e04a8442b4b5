//! BitMEX REST client
//!
//! Signed calls carry an HMAC-SHA256 signature over
//! `method + path + expires`, where `path` includes the query string, sent
//! through the `api-key` / `api-expires` / `api-signature` headers. Public
//! endpoints work without credentials.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use super::models;
use super::stream::BitmexStreamSpec;
use crate::connector::ExchangeConnector;
use crate::error::{ExchangeError, ExchangeResult};
use crate::transport::{self, REQUEST_TIMEOUT};
use crate::types::{
    Balance, Candle, Contract, Exchange, OrderRequest, OrderStatus, OrderType, Quote, Side,
    TimeInForce, Timeframe,
};

pub const BASE_URL: &str = "https://www.bitmex.com";
pub const TESTNET_BASE_URL: &str = "https://testnet.bitmex.com";
pub const WS_URL: &str = "wss://ws.bitmex.com/realtime";
pub const TESTNET_WS_URL: &str = "wss://ws.testnet.bitmex.com/realtime";

/// BitMEX caps bucketed-trade responses at 500 rows per request
const CANDLES_LIMIT: u32 = 500;

/// Signature validity window in seconds
const AUTH_WINDOW_SECS: i64 = 5;

pub struct BitmexClient {
    http: Client,
    base_url: String,
    ws_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl BitmexClient {
    pub fn new(api_key: Option<String>, api_secret: Option<String>, testnet: bool) -> Self {
        let (base_url, ws_url) = if testnet {
            (TESTNET_BASE_URL, TESTNET_WS_URL)
        } else {
            (BASE_URL, WS_URL)
        };
        Self {
            http: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.to_string(),
            ws_url: ws_url.to_string(),
            api_key,
            api_secret,
        }
    }

    /// Read `BITMEX_API_KEY` / `BITMEX_API_SECRET`; both optional, public
    /// endpoints keep working without them.
    pub fn from_env(testnet: bool) -> Self {
        let api_key = std::env::var("BITMEX_API_KEY").ok().filter(|k| !k.is_empty());
        let api_secret = std::env::var("BITMEX_API_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        Self::new(api_key, api_secret, testnet)
    }

    /// Stream half of this connector
    pub fn stream_spec(&self) -> BitmexStreamSpec {
        BitmexStreamSpec::new(self.ws_url.clone())
    }

    fn require_credentials(&self) -> ExchangeResult<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => Err(ExchangeError::MissingCredentials),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, String)],
    ) -> ExchangeResult<T> {
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        let path = if query.is_empty() {
            format!("/api/v1{endpoint}")
        } else {
            format!("/api/v1{endpoint}?{query}")
        };
        debug!(%method, %endpoint, "bitmex request");

        let mut request = self.http.request(method.clone(), format!("{}{}", self.base_url, path));
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            let expires = Utc::now().timestamp() + AUTH_WINDOW_SECS;
            let signature = transport::sign_request_path(secret, method.as_str(), &path, expires);
            request = request
                .header("api-expires", expires)
                .header("api-key", key)
                .header("api-signature", signature);
        }
        let response = request.send().await?;
        transport::read_json(response).await
    }

    fn encode_order(&self, contract: &Contract, request: &OrderRequest) -> Vec<(String, String)> {
        let quantity = contract.round_quantity(request.quantity);
        let mut params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("side".to_string(), side_label(request.side).to_string()),
            ("orderQty".to_string(), contract.format_quantity(quantity)),
            (
                "ordType".to_string(),
                match request.order_type {
                    OrderType::Market => "Market".to_string(),
                    OrderType::Limit => "Limit".to_string(),
                },
            ),
        ];
        if let Some(price) = request.price {
            let price = contract.round_price(price);
            params.push(("price".to_string(), contract.format_price(price)));
        }
        if let Some(tif) = request.time_in_force {
            params.push(("timeInForce".to_string(), tif_label(tif).to_string()));
        }
        params
    }
}

/// BitMEX wants capitalized side labels, not the uppercase wire form
fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    }
}

fn tif_label(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Gtc => "GoodTillCancel",
        TimeInForce::Ioc => "ImmediateOrCancel",
        TimeInForce::Fok => "FillOrKill",
    }
}

#[async_trait]
impl ExchangeConnector for BitmexClient {
    fn exchange(&self) -> Exchange {
        Exchange::Bitmex
    }

    async fn list_contracts(&self) -> ExchangeResult<HashMap<String, Contract>> {
        let instruments: Vec<models::InstrumentInfo> = self
            .request(Method::GET, "/instrument/active", &[])
            .await?;
        Ok(instruments
            .into_iter()
            .map(|i| {
                let contract = i.into_contract();
                (contract.symbol.clone(), contract)
            })
            .collect())
    }

    async fn get_balances(&self) -> ExchangeResult<HashMap<String, Balance>> {
        self.require_credentials()?;
        let params = vec![("currency".to_string(), "all".to_string())];
        let margins: Vec<models::MarginEntry> =
            self.request(Method::GET, "/user/margin", &params).await?;
        Ok(margins
            .into_iter()
            .map(|m| {
                let balance = m.into_balance();
                (balance.asset.clone(), balance)
            })
            .collect())
    }

    async fn get_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> ExchangeResult<Vec<Candle>> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("binSize".to_string(), timeframe.label().to_string()),
            ("partial".to_string(), "false".to_string()),
            ("count".to_string(), CANDLES_LIMIT.to_string()),
            ("reverse".to_string(), "true".to_string()),
        ];
        let rows: Vec<models::BucketedCandle> = self
            .request(Method::GET, "/trade/bucketed", &params)
            .await?;
        // reverse=true returns newest first; the aggregator wants ascending
        let mut candles: Vec<Candle> = rows
            .into_iter()
            .filter_map(|r| r.into_candle(timeframe.as_millis()))
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn get_bid_ask(&self, contract: &Contract) -> ExchangeResult<Quote> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("count".to_string(), "1".to_string()),
            ("reverse".to_string(), "true".to_string()),
        ];
        let quotes: Vec<models::QuoteResponse> =
            self.request(Method::GET, "/quote", &params).await?;
        Ok(quotes
            .into_iter()
            .next()
            .map(models::QuoteResponse::into_quote)
            .unwrap_or(Quote { bid: 0.0, ask: 0.0 }))
    }

    async fn place_order(
        &self,
        contract: &Contract,
        request: &OrderRequest,
    ) -> ExchangeResult<OrderStatus> {
        self.require_credentials()?;
        let params = self.encode_order(contract, request);
        let order: models::OrderResponse =
            self.request(Method::POST, "/order", &params).await?;
        Ok(order.into_order_status())
    }

    async fn cancel_order(
        &self,
        _contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        self.require_credentials()?;
        let params = vec![("orderID".to_string(), order_id.to_string())];
        let orders: Vec<models::OrderResponse> =
            self.request(Method::DELETE, "/order", &params).await?;
        orders
            .into_iter()
            .next()
            .map(models::OrderResponse::into_order_status)
            .ok_or_else(|| ExchangeError::Rejection {
                status: 404,
                body: format!("order {order_id} not found"),
            })
    }

    async fn get_order_status(
        &self,
        _contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        self.require_credentials()?;
        let params = vec![(
            "filter".to_string(),
            json!({ "orderID": order_id }).to_string(),
        )];
        let orders: Vec<models::OrderResponse> =
            self.request(Method::GET, "/order", &params).await?;
        orders
            .into_iter()
            .next()
            .map(models::OrderResponse::into_order_status)
            .ok_or_else(|| ExchangeError::Rejection {
                status: 404,
                body: format!("order {order_id} not found"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BitmexClient {
        BitmexClient::new(None, None, true)
    }

    fn contract() -> Contract {
        Contract {
            symbol: "XBTUSD".to_string(),
            base_asset: "XBT".to_string(),
            quote_asset: "USD".to_string(),
            price_decimals: 1,
            quantity_decimals: 0,
            tick_size: 0.5,
            lot_size: 100.0,
            exchange: Exchange::Bitmex,
        }
    }

    #[test]
    fn test_testnet_urls_selected() {
        let client = client();
        assert_eq!(client.base_url, TESTNET_BASE_URL);
        assert_eq!(client.ws_url, TESTNET_WS_URL);
    }

    #[test]
    fn test_order_params_use_bitmex_labels() {
        let client = client();
        let request = OrderRequest::limit(Side::Buy, 230.0, 35001.3, TimeInForce::Gtc);
        let params = client.encode_order(&contract(), &request);
        let lookup: HashMap<_, _> = params.into_iter().collect();

        assert_eq!(lookup["side"], "Buy");
        assert_eq!(lookup["ordType"], "Limit");
        assert_eq!(lookup["timeInForce"], "GoodTillCancel");
        // quantity snaps to the 100-contract lot, price to the 0.5 tick
        assert_eq!(lookup["orderQty"], "200");
        assert_eq!(lookup["price"], "35001.5");
    }

    #[test]
    fn test_market_order_omits_price_and_tif() {
        let client = client();
        let request = OrderRequest::market(Side::Sell, 100.0);
        let params = client.encode_order(&contract(), &request);
        assert!(params.iter().all(|(k, _)| k != "price" && k != "timeInForce"));
        let lookup: HashMap<_, _> = params.into_iter().collect();
        assert_eq!(lookup["side"], "Sell");
        assert_eq!(lookup["ordType"], "Market");
    }

    #[test]
    fn test_private_calls_require_credentials() {
        assert!(matches!(
            client().require_credentials().unwrap_err(),
            ExchangeError::MissingCredentials
        ));
    }
}
