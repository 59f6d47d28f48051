// In crates/core-types/src/types.rs

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trading pair identifier (e.g., "BTCUSDT"). Always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(pub String);

impl Symbol {
    /// Builds a symbol from user input, trimming and uppercasing it.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The lowercase form used in stream names.
    pub fn to_stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The futures contract qualifier used by the continuous kline endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    #[default]
    Perpetual,
    CurrentQuarter,
    NextQuarter,
}

impl ContractType {
    /// The REST query value (e.g., "PERPETUAL").
    pub fn as_rest_param(&self) -> &'static str {
        match self {
            ContractType::Perpetual => "PERPETUAL",
            ContractType::CurrentQuarter => "CURRENT_QUARTER",
            ContractType::NextQuarter => "NEXT_QUARTER",
        }
    }

    /// The stream name segment (e.g., "perpetual").
    pub fn as_stream_name(&self) -> &'static str {
        match self {
            ContractType::Perpetual => "perpetual",
            ContractType::CurrentQuarter => "current_quarter",
            ContractType::NextQuarter => "next_quarter",
        }
    }
}

impl FromStr for ContractType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "perpetual" => Ok(ContractType::Perpetual),
            "current_quarter" => Ok(ContractType::CurrentQuarter),
            "next_quarter" => Ok(ContractType::NextQuarter),
            _ => Err(Error::InvalidContractType(s.to_string())),
        }
    }
}

/// The kline bucket size, serialized with the exchange's interval codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 15] = [
        Interval::OneSecond,
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::EightHours,
        Interval::TwelveHours,
        Interval::OneDay,
        Interval::ThreeDays,
        Interval::OneWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneSecond => "1s",
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
        }
    }

    /// Length of one bucket in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        const SECOND: i64 = 1_000;
        const MINUTE: i64 = 60 * SECOND;
        const HOUR: i64 = 60 * MINUTE;
        const DAY: i64 = 24 * HOUR;
        match self {
            Interval::OneSecond => SECOND,
            Interval::OneMinute => MINUTE,
            Interval::ThreeMinutes => 3 * MINUTE,
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::OneHour => HOUR,
            Interval::TwoHours => 2 * HOUR,
            Interval::FourHours => 4 * HOUR,
            Interval::SixHours => 6 * HOUR,
            Interval::EightHours => 8 * HOUR,
            Interval::TwelveHours => 12 * HOUR,
            Interval::OneDay => DAY,
            Interval::ThreeDays => 3 * DAY,
            Interval::OneWeek => 7 * DAY,
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == code)
            .ok_or_else(|| Error::UnknownInterval(s.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV sample for a fixed time bucket.
///
/// Invariant (as delivered by the exchange): `low <= {open, close} <= high` and `volume >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start time in epoch milliseconds.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The side a fast moving average crossed the slow one towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossDirection {
    UpCross,
    DownCross,
}

impl CrossDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossDirection::UpCross => "up-cross",
            CrossDirection::DownCross => "down-cross",
        }
    }
}

impl fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected moving-average crossover. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Derived from `time` and `direction`; two signals with the same id are duplicates.
    pub id: String,
    pub time: i64,
    pub direction: CrossDirection,
    /// Close of the bar that triggered the crossing.
    pub price: Decimal,
}

impl Signal {
    pub fn new(time: i64, direction: CrossDirection, price: Decimal) -> Self {
        Self {
            id: format!("{}:{}", time, direction),
            time,
            direction,
            price,
        }
    }

    /// The de-duplication key.
    pub fn key(&self) -> (i64, CrossDirection) {
        (self.time, self.direction)
    }
}

/// Lifecycle of a live stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}
