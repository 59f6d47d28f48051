// In crates/api-client/src/lib.rs

use app_config::types::BinanceSettings;
use async_trait::async_trait;
use core_types::{Bar, Interval, Symbol};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

pub mod error;
pub mod feed;
pub mod live_connector;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use feed::{HistorySource, LiveFeed, StreamEvent};
pub use live_connector::{StreamClient, backoff_delay, decode_frame};
pub use types::*;

/// The exchange rejects larger `limit` values on the klines endpoints.
pub const MAX_KLINES_PER_REQUEST: usize = 1500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl ApiClient {
    /// Constructs a new ApiClient from BinanceSettings.
    pub fn new(settings: &BinanceSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;
        Ok(ApiClient {
            http_client,
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            contract_type: settings.contract_type,
        })
    }

    /// Fetches historical continuous kline (candlestick) data.
    ///
    /// This corresponds to the `GET /fapi/v1/continuousKlines` endpoint. Individual
    /// malformed records are skipped; a transport failure, an exchange error object or
    /// a body that is not an array is an error.
    pub async fn get_continuous_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        let url = format!(
            "{}/fapi/v1/continuousKlines?pair={}&contractType={}&interval={}&limit={}",
            self.base_url,
            symbol.0,
            self.contract_type.as_rest_param(),
            interval.as_str(),
            limit
        );

        let response_body = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;

        let mut bars = parse_klines(&response_body)?;
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }

    /// One-shot backfill used to seed the window.
    ///
    /// Fail-soft: any error is logged and reported as an empty sequence, since the live
    /// stream will populate an empty window anyway.
    pub async fn fetch_history(&self, symbol: &Symbol, interval: Interval, count: usize) -> Vec<Bar> {
        match self.get_continuous_klines(symbol, interval, count).await {
            Ok(bars) => {
                tracing::info!(symbol = %symbol, %interval, count = bars.len(), "Fetched historical klines.");
                bars
            }
            Err(e) => {
                tracing::error!(symbol = %symbol, %interval, error = %e, "Historical kline fetch failed. Continuing with an empty window.");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn fetch_history(&self, symbol: &Symbol, interval: Interval, count: usize) -> Vec<Bar> {
        ApiClient::fetch_history(self, symbol, interval, count).await
    }
}

// Free function to allow api_client::new usage
pub fn new(settings: &BinanceSettings) -> Result<ApiClient> {
    ApiClient::new(settings)
}

/// Decodes a klines response body: an array of
/// `[openTime, open, high, low, close, volume, closeTime, ...]` records.
///
/// Records that cannot be decoded, or that would break strictly ascending open time,
/// are skipped with a warning.
pub fn parse_klines(body: &str) -> Result<Vec<Bar>> {
    let value: Value = serde_json::from_str(body).map_err(Error::DeserializationFailed)?;

    // Binance returns an error object on failure, so we check for that first.
    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        let msg = value.get("msg").and_then(Value::as_str).unwrap_or("Unknown error").to_string();
        return Err(Error::ApiError { code, msg });
    }

    let records = value
        .as_array()
        .ok_or_else(|| Error::UnexpectedPayload("klines response is not an array".into()))?;

    let mut bars: Vec<Bar> = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let bar = match bar_from_record(record) {
            Ok(bar) => bar,
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed kline record.");
                continue;
            }
        };
        if let Some(last) = bars.last() {
            if bar.time <= last.time {
                tracing::warn!(index, time = bar.time, last_time = last.time, "Skipping out-of-order kline record.");
                continue;
            }
        }
        bars.push(bar);
    }
    Ok(bars)
}

fn bar_from_record(record: &Value) -> Result<Bar> {
    let fields = record
        .as_array()
        .filter(|fields| fields.len() >= 6)
        .ok_or_else(|| Error::UnexpectedPayload(format!("kline record is not an array of 6+ fields: {record}")))?;

    let time = fields[0]
        .as_i64()
        .ok_or_else(|| Error::InvalidNumber { field: "open_time", value: fields[0].to_string() })?;

    Ok(Bar {
        time,
        open: decimal_field(&fields[1], "open")?,
        high: decimal_field(&fields[2], "high")?,
        low: decimal_field(&fields[3], "low")?,
        close: decimal_field(&fields[4], "close")?,
        volume: decimal_field(&fields[5], "volume")?,
    })
}

/// Numerics arrive as strings; plain JSON numbers are accepted as well.
fn decimal_field(value: &Value, field: &'static str) -> Result<Decimal> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(Error::InvalidNumber { field, value: other.to_string() }),
    };
    text.parse::<Decimal>()
        .map_err(|_| Error::InvalidNumber { field, value: text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BODY: &str = r#"[
        [1700000000000, "100.5", "101.0", "99.5", "100.0", "12.25", 1700000059999, "1225.0", 42, "6.0", "600.0", "0"],
        [1700000060000, "100.0", "102.0", "99.0", "101.5", "3.5", 1700000119999, "355.0", 10, "1.0", "100.0", "0"]
    ]"#;

    #[test]
    fn parses_records_in_response_order() {
        let bars = parse_klines(BODY).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 1_700_000_000_000);
        assert_eq!(bars[0].open, dec!(100.5));
        assert_eq!(bars[0].high, dec!(101.0));
        assert_eq!(bars[0].low, dec!(99.5));
        assert_eq!(bars[0].close, dec!(100.0));
        assert_eq!(bars[0].volume, dec!(12.25));
        assert_eq!(bars[1].close, dec!(101.5));
    }

    #[test]
    fn skips_malformed_records_and_keeps_the_rest() {
        let body = r#"[
            [1, "1", "1", "1", "1", "1"],
            [2, "not-a-number", "1", "1", "1", "1"],
            "garbage",
            [3, "1", "1"],
            [4, "2", "2", "2", "2", "2"]
        ]"#;
        let bars = parse_klines(body).unwrap();
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1, 4]);
    }

    #[test]
    fn skips_records_that_go_backwards() {
        let body = r#"[
            [5, "1", "1", "1", "1", "1"],
            [5, "2", "2", "2", "2", "2"],
            [3, "1", "1", "1", "1", "1"],
            [6, "1", "1", "1", "1", "1"]
        ]"#;
        let times: Vec<i64> = parse_klines(body).unwrap().iter().map(|b| b.time).collect();
        assert_eq!(times, vec![5, 6]);
    }

    #[test]
    fn exchange_error_object_is_an_api_error() {
        let err = parse_klines(r#"{"code": -1121, "msg": "Invalid symbol."}"#).unwrap_err();
        match err {
            Error::ApiError { code, msg } => {
                assert_eq!(code, -1121);
                assert_eq!(msg, "Invalid symbol.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_json_body_is_a_deserialization_error() {
        assert!(matches!(parse_klines("<html>502</html>"), Err(Error::DeserializationFailed(_))));
        assert!(matches!(parse_klines(r#"{"foo": 1}"#), Err(Error::UnexpectedPayload(_))));
    }
}
