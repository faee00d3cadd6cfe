#![allow(dead_code)]

use bracketbot::config::Credentials;
use bracketbot::BinanceClient;
use serde_json::{json, Value};
use std::time::Duration;

pub const SYMBOL: &str = "BTCUSDT";
pub const API_KEY: &str = "test-api-key";

/// Hourly candles starting 2024-01-01T00:00Z, one per close
pub fn klines_body(closes: &[f64]) -> String {
    let start_ms: i64 = 1_704_067_200_000;
    let hour_ms: i64 = 3_600_000;

    let rows: Vec<Value> = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let open_time = start_ms + i as i64 * hour_ms;
            json!([
                open_time,
                close.to_string(),
                close.to_string(),
                close.to_string(),
                close.to_string(),
                "12.5",
                open_time + hour_ms - 1,
                "1000.0",
                100,
                "6.0",
                "600.0",
                "0"
            ])
        })
        .collect();

    Value::Array(rows).to_string()
}

/// Steep decline that is flattening out: oversold, below its SMA, MACD turning up
pub fn oversold_closes() -> Vec<f64> {
    (0..60)
        .map(|i| 100.0 + 100.0 * (-(i as f64) / 15.0).exp())
        .collect()
}

pub fn exchange_info_body(status: &str) -> String {
    json!({
        "timezone": "UTC",
        "serverTime": 1_704_067_200_000i64,
        "symbols": [{
            "symbol": SYMBOL,
            "status": status,
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "1000000.00000000", "tickSize": "0.01000000"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001000", "maxQty": "9000.00000000", "stepSize": "0.00001000"},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true}
            ]
        }]
    })
    .to_string()
}

pub fn open_order_json(order_id: i64, client_order_id: &str, order_type: &str) -> Value {
    json!({
        "symbol": SYMBOL,
        "orderId": order_id,
        "clientOrderId": client_order_id,
        "price": "0.00000000",
        "origQty": "0.05000000",
        "status": "NEW",
        "type": order_type,
        "side": "SELL",
        "stopPrice": "95.00000000"
    })
}

pub fn order_ack_body(order_id: i64, client_order_id: &str, status: &str) -> String {
    json!({
        "symbol": SYMBOL,
        "orderId": order_id,
        "clientOrderId": client_order_id,
        "transactTime": 1_704_067_200_000i64,
        "status": status,
        "type": "MARKET",
        "side": "BUY"
    })
    .to_string()
}

pub fn signed_client(url: &str) -> BinanceClient {
    BinanceClient::new(
        url,
        Some(Credentials {
            api_key: API_KEY.to_string(),
            api_secret: "test-api-secret".to_string(),
        }),
    )
    .unwrap()
    .with_retry_backoff(Duration::from_millis(1))
}

pub fn public_client(url: &str) -> BinanceClient {
    BinanceClient::new(url, None)
        .unwrap()
        .with_retry_backoff(Duration::from_millis(1))
}
