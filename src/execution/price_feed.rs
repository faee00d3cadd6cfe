use async_trait::async_trait;

use crate::api::BinanceClient;
use crate::error::{Result, TradingError};
use crate::models::Candle;

/// Source of historical candles for one symbol / interval
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `limit` candles, oldest first
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let candles = self.klines(symbol, interval, limit).await?;
        validate_candle_sequence(&candles, interval_seconds(interval))?;

        tracing::info!(
            symbol = %symbol,
            interval = %interval,
            candles = candles.len(),
            "Fetched candles"
        );

        Ok(candles)
    }
}

/// Closing prices, oldest first
pub fn closing_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Length in seconds of a kline interval string such as `5m`, `1h` or `1d`
pub fn interval_seconds(interval: &str) -> Option<u64> {
    let unit = interval.chars().last()?;
    let count: u64 = interval[..interval.len() - unit.len_utf8()].parse().ok()?;

    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        // Months vary in length; gap detection is skipped for them
        _ => return None,
    };

    Some(count * unit_secs)
}

/// Validate candle ordering and warn about gaps
///
/// # Returns
/// * `Ok(())` if candles are strictly ascending by open time
/// * `Err` if they are out of order or duplicated
///
/// Gaps larger than 1.5x the interval (exchange maintenance) are only logged,
/// since indicators still compute on the remaining data.
pub fn validate_candle_sequence(candles: &[Candle], interval_secs: Option<u64>) -> Result<()> {
    for window in candles.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff <= 0 {
            return Err(TradingError::MalformedResponse(format!(
                "candles are not sorted by open time ({} then {})",
                window[0].open_time, window[1].open_time
            )));
        }

        if let Some(expected) = interval_secs {
            let max_gap_secs = expected + expected / 2;
            if time_diff as u64 > max_gap_secs {
                tracing::warn!(
                    "Data gap detected: {}s between candles (expected ~{}s) from {} to {}",
                    time_diff,
                    expected,
                    window[0].open_time.format("%Y-%m-%d %H:%M"),
                    window[1].open_time.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn create_test_candle(minutes_ago: i64, close: f64) -> Candle {
        let open_time = Utc::now() - Duration::minutes(minutes_ago);
        Candle {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            close_time: open_time + Duration::minutes(5) - Duration::milliseconds(1),
        }
    }

    #[test]
    fn test_ascending_candles_pass() {
        let candles = vec![
            create_test_candle(10, 100.0),
            create_test_candle(5, 101.0),
            create_test_candle(0, 102.0),
        ];

        assert!(validate_candle_sequence(&candles, Some(300)).is_ok());
    }

    #[test]
    fn test_gap_is_tolerated() {
        let candles = vec![
            create_test_candle(60, 100.0), // 55 min gap
            create_test_candle(5, 101.0),
            create_test_candle(0, 102.0),
        ];

        assert!(validate_candle_sequence(&candles, Some(300)).is_ok());
    }

    #[test]
    fn test_backwards_timestamps_fail() {
        let candles = vec![create_test_candle(0, 100.0), create_test_candle(5, 101.0)];

        let result = validate_candle_sequence(&candles, Some(300));
        assert!(result.unwrap_err().to_string().contains("not sorted"));
    }

    #[test]
    fn test_duplicate_timestamps_fail() {
        let candle = create_test_candle(5, 100.0);
        let candles = vec![candle.clone(), candle];

        assert!(validate_candle_sequence(&candles, None).is_err());
    }

    #[test]
    fn test_single_candle_ok() {
        let candles = vec![create_test_candle(0, 100.0)];
        assert!(validate_candle_sequence(&candles, Some(300)).is_ok());
    }

    #[test]
    fn test_interval_seconds() {
        assert_eq!(interval_seconds("1m"), Some(60));
        assert_eq!(interval_seconds("15m"), Some(900));
        assert_eq!(interval_seconds("1h"), Some(3_600));
        assert_eq!(interval_seconds("4h"), Some(14_400));
        assert_eq!(interval_seconds("1d"), Some(86_400));
        assert_eq!(interval_seconds("1M"), None);
        assert_eq!(interval_seconds(""), None);
        assert_eq!(interval_seconds("h"), None);
    }

    #[test]
    fn test_closing_prices() {
        let candles = vec![create_test_candle(5, 100.0), create_test_candle(0, 101.5)];
        assert_eq!(closing_prices(&candles), vec![100.0, 101.5]);
    }
}
