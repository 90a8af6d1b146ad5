//! Binance USDⓈ-M futures gateway
//!
//! Signed REST calls against the futures API. Responses are parsed into
//! typed structs; zero-exposure positions are filtered out before they
//! reach the core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::types::{Order, OrderStatus, Position, PositionSide, Side, Symbol};
use crate::core::config::ExchangeConfig;
use crate::exchange::{ExchangeGateway, OrderRequest};

const PROD_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance futures REST gateway
pub struct BinanceGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

impl BinanceGateway {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("missing Binance API key".to_string()))?;
        let api_secret = config
            .api_secret
            .clone()
            .ok_or_else(|| Error::Config("missing Binance API secret".to_string()))?;

        let base_url = if config.testnet { TESTNET_URL } else { PROD_URL };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key,
            api_secret,
            recv_window_ms: config.recv_window_ms,
        })
    }

    fn timestamp_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
    }

    /// Assemble a query string, append timestamp/recvWindow and sign it
    /// with HMAC-SHA256 over the whole string.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut parts: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        parts.push(format!("recvWindow={}", self.recv_window_ms));
        parts.push(format!("timestamp={}", Self::timestamp_ms()));
        let query = parts.join("&");

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("{}&signature={}", query, signature)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("invalid API key: {}", e)))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Exchange(format!("{}: {}", status, body)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn get_mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!(
            "{}/fapi/v1/premiumIndex?symbol={}",
            self.base_url, symbol
        );
        let resp = self.send(self.client.get(&url)).await?;
        let data: MarkPriceResponse = resp.json().await?;
        Ok(data.mark_price)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        let url = format!(
            "{}/fapi/v1/leverage?{}",
            self.base_url,
            self.signed_query(&params)
        );
        self.send(self.client.post(&url).headers(self.auth_headers()?))
            .await?;
        debug!("Leverage set: {} {}x", symbol, leverage);
        Ok(())
    }

    async fn submit_order(&self, request: OrderRequest) -> Result<Order> {
        let mut params = vec![
            ("symbol", request.symbol.to_string()),
            ("side", request.side.to_string()),
            ("type", request.order_type.to_string()),
            ("quantity", request.quantity.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if let Some(stop_price) = request.stop_price {
            params.push(("stopPrice", stop_price.to_string()));
        }
        if request.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let url = format!(
            "{}/fapi/v1/order?{}",
            self.base_url,
            self.signed_query(&params)
        );
        let resp = self
            .send(self.client.post(&url).headers(self.auth_headers()?))
            .await?;
        let data: OrderResponse = resp.json().await?;
        Ok(data.into_order(request.leverage))
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>> {
        let params = [("symbol", symbol.to_string())];
        let url = format!(
            "{}/fapi/v2/positionRisk?{}",
            self.base_url,
            self.signed_query(&params)
        );
        let resp = self
            .send(self.client.get(&url).headers(self.auth_headers()?))
            .await?;
        let data: Vec<PositionResponse> = resp.json().await?;
        Ok(data.into_iter().find_map(PositionResponse::into_position))
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>> {
        let url = format!(
            "{}/fapi/v2/positionRisk?{}",
            self.base_url,
            self.signed_query(&[])
        );
        let resp = self
            .send(self.client.get(&url).headers(self.auth_headers()?))
            .await?;
        let data: Vec<PositionResponse> = resp.json().await?;
        Ok(data
            .into_iter()
            .filter_map(PositionResponse::into_position)
            .collect())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        let params = [("symbol", symbol.to_string())];
        let url = format!(
            "{}/fapi/v1/allOpenOrders?{}",
            self.base_url,
            self.signed_query(&params)
        );
        self.send(self.client.delete(&url).headers(self.auth_headers()?))
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "binance-futures"
    }
}

fn decimal_from_str<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn u32_from_str<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Response from GET /fapi/v1/premiumIndex
#[derive(Debug, Deserialize)]
struct MarkPriceResponse {
    #[serde(rename = "markPrice", deserialize_with = "decimal_from_str")]
    mark_price: Decimal,
}

/// Response from POST /fapi/v1/order
#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
    symbol: String,
    side: Side,
    #[serde(rename = "origQty", deserialize_with = "decimal_from_str")]
    orig_qty: Decimal,
    #[serde(rename = "avgPrice", deserialize_with = "decimal_from_str", default)]
    avg_price: Decimal,
    #[serde(deserialize_with = "decimal_from_str", default)]
    price: Decimal,
    status: String,
    #[serde(rename = "updateTime")]
    update_time: i64,
}

impl OrderResponse {
    fn into_order(self, leverage: u32) -> Order {
        // Market orders report the fill through avgPrice; fall back to the
        // order price for unfilled entries.
        let price = if self.avg_price.is_zero() {
            self.price
        } else {
            self.avg_price
        };

        Order {
            id: self.order_id.to_string(),
            symbol: Symbol::new(self.symbol),
            side: self.side,
            quantity: self.orig_qty,
            price,
            leverage,
            status: OrderStatus::from_exchange(&self.status),
            stop_loss: None,
            take_profit: None,
            created_at: DateTime::<Utc>::from_timestamp_millis(self.update_time)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Entry from GET /fapi/v2/positionRisk
#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    #[serde(rename = "positionAmt", deserialize_with = "decimal_from_str")]
    position_amt: Decimal,
    #[serde(rename = "entryPrice", deserialize_with = "decimal_from_str")]
    entry_price: Decimal,
    #[serde(deserialize_with = "u32_from_str")]
    leverage: u32,
    #[serde(rename = "isolatedMargin", deserialize_with = "decimal_from_str")]
    isolated_margin: Decimal,
    #[serde(rename = "liquidationPrice", deserialize_with = "decimal_from_str")]
    liquidation_price: Decimal,
    #[serde(rename = "unRealizedProfit", deserialize_with = "decimal_from_str")]
    unrealized_profit: Decimal,
}

impl PositionResponse {
    /// Returns `None` for zero exposure; the cache never holds
    /// zero-quantity entries.
    fn into_position(self) -> Option<Position> {
        if self.position_amt.is_zero() {
            return None;
        }

        let side = if self.position_amt > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        };

        Some(Position {
            symbol: Symbol::new(self.symbol),
            side,
            quantity: self.position_amt.abs(),
            entry_price: self.entry_price,
            leverage: self.leverage,
            margin: self.isolated_margin,
            liquidation_price: if self.liquidation_price.is_zero() {
                None
            } else {
                Some(self.liquidation_price)
            },
            unrealized_pnl: self.unrealized_profit,
        })
    }
}
