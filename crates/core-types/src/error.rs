// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown kline interval: {0}")]
    UnknownInterval(String),
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("Invalid contract type: {0:?}")]
    InvalidContractType(String),
}

pub type Result<T> = std::result::Result<T, Error>;
