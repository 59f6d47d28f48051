// In crates/app-config/src/types.rs

use core_types::{ContractType, Interval, Symbol};
use serde::Deserialize;
use strategies::types::MACrossoverSettings;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the Binance endpoints.
    pub binance: BinanceSettings,
    /// The instrument and window the pipeline starts with.
    pub market: MarketSettings,
    /// Fast/slow periods for the crossover detector.
    #[serde(default)]
    pub strategy: MACrossoverSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BinanceSettings {
    /// The REST API base URL for Binance Futures.
    pub rest_base_url: String,
    /// The WebSocket base URL for Binance Futures.
    pub ws_base_url: String,
    /// The contract qualifier for continuous klines.
    #[serde(default)]
    pub contract_type: ContractType,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MarketSettings {
    pub symbol: Symbol,
    pub interval: Interval,
    /// Maximum number of bars held in the sliding window.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StreamSettings {
    /// Bound of the channel between the socket task and the consumer loop.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Retry policy for a dropped stream. `max_attempts = 0` disables reconnection.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Helper functions for serde defaults
fn default_window_capacity() -> usize { 180 }
fn default_channel_capacity() -> usize { 1024 }
fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 30_000 }
