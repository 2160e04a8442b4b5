//! Binance Futures REST client
//!
//! Signed calls carry an HMAC-SHA256 signature over the URL-encoded parameter
//! string plus a millisecond timestamp; the API key travels in the
//! `X-MBX-APIKEY` header. Parameters go in the query string for every method.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

use super::models;
use super::stream::BinanceStreamSpec;
use crate::connector::ExchangeConnector;
use crate::error::{ExchangeError, ExchangeResult};
use crate::transport::{self, REQUEST_TIMEOUT};
use crate::types::{
    Balance, Candle, Contract, Exchange, OrderRequest, OrderStatus, OrderType, Quote, Timeframe,
};

pub const BASE_URL: &str = "https://fapi.binance.com";
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";
pub const WS_URL: &str = "wss://fstream.binance.com/ws";
pub const TESTNET_WS_URL: &str = "wss://stream.binancefuture.com/ws";

/// Binance caps the klines endpoint at 1000 points per request
const KLINES_LIMIT: u32 = 1000;

pub struct BinanceFuturesClient {
    http: Client,
    base_url: String,
    ws_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl BinanceFuturesClient {
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

    /// Read `BINANCE_API_KEY` / `BINANCE_API_SECRET`; both optional, public
    /// endpoints keep working without them.
    pub fn from_env(testnet: bool) -> Self {
        let api_key = std::env::var("BINANCE_API_KEY").ok().filter(|k| !k.is_empty());
        let api_secret = std::env::var("BINANCE_API_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        Self::new(api_key, api_secret, testnet)
    }

    /// Stream half of this connector
    pub fn stream_spec(&self) -> BinanceStreamSpec {
        BinanceStreamSpec::new(self.ws_url.clone())
    }

    /// Append timestamp and signature to a parameter set
    fn sign_params(&self, mut params: Vec<(String, String)>) -> ExchangeResult<String> {
        let secret = self
            .api_secret
            .as_deref()
            .ok_or(ExchangeError::MissingCredentials)?;
        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));
        transport::sign_query(secret, &params)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
    ) -> ExchangeResult<T> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };
        debug!(%method, %endpoint, "binance request");

        let mut request = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }
        let response = request.send().await?;
        transport::read_json(response).await
    }

    fn encode_order(&self, contract: &Contract, request: &OrderRequest) -> Vec<(String, String)> {
        let quantity = contract.round_quantity(request.quantity);
        let mut params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("side".to_string(), request.side.to_string()),
            ("quantity".to_string(), contract.format_quantity(quantity)),
            (
                "type".to_string(),
                match request.order_type {
                    OrderType::Market => "MARKET".to_string(),
                    OrderType::Limit => "LIMIT".to_string(),
                },
            ),
        ];
        if let Some(price) = request.price {
            let price = contract.round_price(price);
            params.push(("price".to_string(), contract.format_price(price)));
        }
        if let Some(tif) = request.time_in_force {
            params.push(("timeInForce".to_string(), tif.to_string()));
        }
        params
    }
}

#[async_trait]
impl ExchangeConnector for BinanceFuturesClient {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn list_contracts(&self) -> ExchangeResult<HashMap<String, Contract>> {
        let info: models::ExchangeInfoResponse = self
            .request(Method::GET, "/fapi/v1/exchangeInfo", "")
            .await?;
        Ok(info
            .symbols
            .into_iter()
            .map(|s| {
                let contract = s.into_contract();
                (contract.symbol.clone(), contract)
            })
            .collect())
    }

    async fn get_balances(&self) -> ExchangeResult<HashMap<String, Balance>> {
        let query = self.sign_params(Vec::new())?;
        let account: models::AccountResponse = self
            .request(Method::GET, "/fapi/v1/account", &query)
            .await?;
        Ok(account
            .assets
            .into_iter()
            .map(|a| {
                let balance = a.into_balance();
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
            ("interval".to_string(), timeframe.label().to_string()),
            ("limit".to_string(), KLINES_LIMIT.to_string()),
        ];
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        let rows: Vec<serde_json::Value> = self
            .request(Method::GET, "/fapi/v1/klines", &query)
            .await?;
        Ok(rows.iter().filter_map(models::candle_from_kline).collect())
    }

    async fn get_bid_ask(&self, contract: &Contract) -> ExchangeResult<Quote> {
        let query = format!("symbol={}", contract.symbol);
        let ticker: models::BookTickerResponse = self
            .request(Method::GET, "/fapi/v1/ticker/bookTicker", &query)
            .await?;
        Ok(ticker.into_quote())
    }

    async fn place_order(
        &self,
        contract: &Contract,
        request: &OrderRequest,
    ) -> ExchangeResult<OrderStatus> {
        let params = self.encode_order(contract, request);
        let query = self.sign_params(params)?;
        let order: models::OrderResponse =
            self.request(Method::POST, "/fapi/v1/order", &query).await?;
        Ok(order.into_order_status())
    }

    async fn cancel_order(
        &self,
        contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let query = self.sign_params(params)?;
        let order: models::OrderResponse = self
            .request(Method::DELETE, "/fapi/v1/order", &query)
            .await?;
        Ok(order.into_order_status())
    }

    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &str,
    ) -> ExchangeResult<OrderStatus> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let query = self.sign_params(params)?;
        let order: models::OrderResponse =
            self.request(Method::GET, "/fapi/v1/order", &query).await?;
        Ok(order.into_order_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn client() -> BinanceFuturesClient {
        BinanceFuturesClient::new(None, None, true)
    }

    fn contract() -> Contract {
        Contract {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            price_decimals: 1,
            quantity_decimals: 2,
            tick_size: 0.5,
            lot_size: 0.01,
            exchange: Exchange::Binance,
        }
    }

    #[test]
    fn test_testnet_urls_selected() {
        let client = client();
        assert_eq!(client.base_url, TESTNET_BASE_URL);
        assert_eq!(client.ws_url, TESTNET_WS_URL);
    }

    #[test]
    fn test_order_params_coerced_to_grid() {
        let client = client();
        let request = OrderRequest::limit(Side::Buy, 0.1234, 101.237, crate::types::TimeInForce::Gtc);
        let params = client.encode_order(&contract(), &request);
        let lookup: HashMap<_, _> = params.into_iter().collect();

        assert_eq!(lookup["quantity"], "0.12");
        assert_eq!(lookup["price"], "101.0");
        assert_eq!(lookup["side"], "BUY");
        assert_eq!(lookup["type"], "LIMIT");
        assert_eq!(lookup["timeInForce"], "GTC");
    }

    #[test]
    fn test_market_order_omits_price_and_tif() {
        let client = client();
        let request = OrderRequest::market(Side::Sell, 1.0);
        let params = client.encode_order(&contract(), &request);
        assert!(params.iter().all(|(k, _)| k != "price" && k != "timeInForce"));
    }

    #[test]
    fn test_signed_call_without_credentials_fails() {
        let client = client();
        let err = client.sign_params(Vec::new()).unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials));
    }
}
