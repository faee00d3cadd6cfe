use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Credentials, ExchangeSettings};
use crate::error::{Result, TradingError};
use crate::models::{Candle, OpenOrder, OrderAck, OrderRequest, OrderSide, SymbolRules};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 600;
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;
const MAX_RETRIES: u32 = 3;
const INVALID_SYMBOL_CODE: i64 = -1121;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot REST client
///
/// Public endpoints (klines, exchange info) are retried on 429 / 5xx.
/// Signed endpoints that mutate orders are sent exactly once.
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
    retry_backoff: Duration,
}

/// Error body Binance returns with non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderResponse {
    symbol: String,
    order_id: i64,
    client_order_id: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    symbol: String,
    order_id: i64,
    client_order_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    transact_time: Option<i64>,
}

impl BinanceClient {
    /// Create a client with default rate limit and receive window
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Result<Self> {
        Self::build(
            base_url.into(),
            credentials,
            DEFAULT_REQUESTS_PER_MINUTE,
            DEFAULT_RECV_WINDOW_MS,
            Duration::from_secs(10),
        )
    }

    pub fn from_settings(
        settings: &ExchangeSettings,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        Self::build(
            settings.base_url.clone(),
            credentials,
            settings.requests_per_minute,
            settings.recv_window_ms,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn build(
        base_url: String,
        credentials: Option<Credentials>,
        requests_per_minute: u32,
        recv_window_ms: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                TradingError::Connectivity(format!("failed to build HTTP client: {}", e))
            })?;

        let rpm = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            TradingError::InvalidConfig("requests_per_minute must be > 0".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
            rate_limiter,
            retry_backoff: Duration::from_secs(1),
        })
    }

    /// Base delay between retries of public requests (doubles per attempt)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Generate HMAC-SHA256 signature for a query string
    fn sign_request(secret: &str, query_string: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Make a rate-limited public GET with retry logic
    async fn get_public(&self, path: &str, params: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;
            let backoff = self.retry_backoff * 2u32.pow(attempt - 1);

            match self.client.get(&url).query(params).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Binance {} returned {}, retrying in {:?} (attempt {}/{})",
                            path,
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    return Err(Self::error_from_response(response).await);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error on {}: {}, retrying in {:?} (attempt {}/{})",
                        path,
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(TradingError::Connectivity(format!(
                        "network error after {} attempts: {}",
                        MAX_RETRIES, e
                    )))
                }
            }
        }

        Err(TradingError::Connectivity(format!(
            "{} failed after {} attempts",
            path, MAX_RETRIES
        )))
    }

    /// Send a signed request once; no retries so orders are never duplicated
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<Response> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            TradingError::Connectivity("no API credentials configured for signed request".into())
        })?;

        let mut params = params;
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = Self::sign_request(&credentials.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(response)
    }

    /// Map a non-2xx response onto the error taxonomy
    async fn error_from_response(response: Response) -> TradingError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let api_error = serde_json::from_str::<ApiError>(&body).ok();

        let outage = status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error();

        match api_error {
            Some(err) if !outage => TradingError::Rejected {
                code: err.code,
                message: err.msg,
            },
            Some(err) => {
                TradingError::Connectivity(format!("HTTP {} ({}): {}", status, err.code, err.msg))
            }
            None => TradingError::Connectivity(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Fetch klines, oldest first
    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        tracing::debug!("Fetching {} {} klines for {}", limit, interval, symbol);

        let response = self
            .get_public(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        // Binance klines format: [openTime, open, high, low, close, volume, closeTime, ...]
        let rows: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| TradingError::MalformedResponse(format!("klines: {}", e)))?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                parse_kline(row).ok_or_else(|| {
                    TradingError::MalformedResponse(format!("kline row {} is malformed", i))
                })
            })
            .collect()
    }

    /// Trading rules for a symbol; `None` if the venue does not list it
    pub async fn exchange_info(&self, symbol: &str) -> Result<Option<SymbolRules>> {
        let response = match self
            .get_public("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await
        {
            Ok(response) => response,
            Err(TradingError::Rejected { code, .. }) if code == INVALID_SYMBOL_CODE => {
                tracing::debug!("{} is not listed on Binance", symbol);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let info: ExchangeInfo = response
            .json()
            .await
            .map_err(|e| TradingError::MalformedResponse(format!("exchangeInfo: {}", e)))?;

        info.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .map(parse_symbol_rules)
            .transpose()
    }

    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let response = self
            .send_signed(
                Method::GET,
                "/api/v3/openOrders",
                vec![("symbol", symbol.to_string())],
            )
            .await?;

        let orders: Vec<OpenOrderResponse> = response
            .json()
            .await
            .map_err(|e| TradingError::MalformedResponse(format!("openOrders: {}", e)))?;

        orders
            .into_iter()
            .map(|o| {
                let side = match o.side.as_str() {
                    "BUY" => OrderSide::Buy,
                    "SELL" => OrderSide::Sell,
                    other => {
                        return Err(TradingError::MalformedResponse(format!(
                            "unknown order side {}",
                            other
                        )))
                    }
                };
                Ok(OpenOrder {
                    symbol: o.symbol,
                    order_id: o.order_id.to_string(),
                    client_order_id: o.client_order_id,
                    side,
                    order_type: o.order_type,
                })
            })
            .collect()
    }

    pub async fn new_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.kind.venue_type().to_string()),
            ("quantity", order.quantity.normalize().to_string()),
            ("newClientOrderId", order.client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if let Some(stop_price) = order.kind.stop_price() {
            params.push(("stopPrice", stop_price.normalize().to_string()));
        }

        let response = self
            .send_signed(Method::POST, "/api/v3/order", params)
            .await?;

        let ack: NewOrderResponse = response
            .json()
            .await
            .map_err(|e| TradingError::MalformedResponse(format!("order: {}", e)))?;

        Ok(OrderAck {
            symbol: ack.symbol,
            order_id: ack.order_id.to_string(),
            client_order_id: ack.client_order_id,
            status: ack.status.unwrap_or_else(|| "NEW".to_string()),
            transact_time: ack.transact_time.and_then(DateTime::from_timestamp_millis),
        })
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.cancel(symbol, ("orderId", order_id)).await
    }

    /// Cancel by the `newClientOrderId` the order was submitted with
    pub async fn cancel_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<()> {
        self.cancel(symbol, ("origClientOrderId", client_order_id)).await
    }

    async fn cancel(&self, symbol: &str, (key, id): (&'static str, &str)) -> Result<()> {
        self.send_signed(
            Method::DELETE,
            "/api/v3/order",
            vec![("symbol", symbol.to_string()), (key, id.to_string())],
        )
        .await?;
        Ok(())
    }
}

fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 7 {
        return None;
    }

    let number = |v: &serde_json::Value| v.as_str()?.parse::<f64>().ok();

    Some(Candle {
        open_time: DateTime::from_timestamp_millis(row[0].as_i64()?)?,
        open: number(&row[1])?,
        high: number(&row[2])?,
        low: number(&row[3])?,
        close: number(&row[4])?,
        volume: number(&row[5])?,
        close_time: DateTime::from_timestamp_millis(row[6].as_i64()?)?,
    })
}

fn parse_symbol_rules(info: SymbolInfo) -> Result<SymbolRules> {
    let mut rules = SymbolRules {
        symbol: info.symbol,
        status: info.status,
        base_asset: info.base_asset,
        quote_asset: info.quote_asset,
        min_qty: Decimal::ZERO,
        step_size: Decimal::ZERO,
        tick_size: Decimal::ZERO,
        min_notional: Decimal::ZERO,
    };

    for filter in &info.filters {
        match filter.get("filterType").and_then(|t| t.as_str()) {
            Some("LOT_SIZE") => {
                rules.min_qty = filter_decimal(filter, "minQty")?;
                rules.step_size = filter_decimal(filter, "stepSize")?;
            }
            Some("PRICE_FILTER") => {
                rules.tick_size = filter_decimal(filter, "tickSize")?;
            }
            // Older listings use MIN_NOTIONAL, newer ones NOTIONAL
            Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                rules.min_notional = filter_decimal(filter, "minNotional")?;
            }
            _ => {}
        }
    }

    Ok(rules)
}

fn filter_decimal(filter: &serde_json::Value, field: &str) -> Result<Decimal> {
    filter
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| {
            TradingError::MalformedResponse(format!("symbol filter is missing {}", field))
        })
}
