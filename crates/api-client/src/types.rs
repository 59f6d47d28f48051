// In crates/api-client/src/types.rs

use core_types::{Bar, ContractType};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The REST client for the Binance Futures market-data endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The persistent HTTP client.
    pub http_client: Client,
    /// The base URL for the Binance Futures API.
    pub base_url: String,
    /// Contract qualifier sent with every continuous kline request.
    pub contract_type: ContractType,
}

/// One decoded kline update from the live stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BarUpdate {
    pub bar: Bar,
    /// `true` once the exchange will not revise this bar again.
    pub is_closed: bool,
}

/// Represents a single kline event from a WebSocket stream.
///
/// Covers both `continuous_kline` (pair in `ps`) and plain `kline` (symbol in `s`) events.
#[derive(Debug, Deserialize, Clone)]
pub struct WsKlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "ps", alias = "s")]
    pub pair: String,
    #[serde(rename = "ct", default)]
    pub contract_type: Option<String>,
    #[serde(rename = "k")]
    pub kline: WsKline,
}

/// Represents the kline data within a WebSocket event.
#[derive(Debug, Deserialize, Clone)]
pub struct WsKline {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "x")]
    pub is_closed: bool, // Is this kline final?
}

impl WsKline {
    pub fn to_update(&self) -> BarUpdate {
        BarUpdate {
            bar: Bar {
                time: self.open_time,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
                volume: self.volume,
            },
            is_closed: self.is_closed,
        }
    }
}
