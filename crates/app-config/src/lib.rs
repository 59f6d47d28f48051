// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{
    AppSettings, BinanceSettings, MarketSettings, ReconnectSettings, Settings, StreamSettings,
};

/// Loads the application settings from the `config/` directory.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(Path::new("config"))
}

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings_from(config_dir: &Path) -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::from(config_dir.join("base")))
        .add_source(File::from(config_dir.join(&environment)).required(false))
        // e.g. `APP__MARKET__SYMBOL=ETHUSDT`. The prefix is `APP`, separator is `__`.
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    validate(&settings)?;

    Ok(settings)
}

/// Checks the cross-field constraints serde cannot express.
pub fn validate(settings: &Settings) -> Result<()> {
    let strategy = &settings.strategy;
    if strategy.fast_period == 0 {
        return Err(Error::Invalid("strategy.fast_period must be at least 1".into()));
    }
    if strategy.slow_period <= strategy.fast_period {
        return Err(Error::Invalid(format!(
            "strategy.slow_period ({}) must be greater than strategy.fast_period ({})",
            strategy.slow_period, strategy.fast_period
        )));
    }
    if settings.market.window_capacity <= strategy.slow_period {
        return Err(Error::Invalid(format!(
            "market.window_capacity ({}) must exceed strategy.slow_period ({})",
            settings.market.window_capacity, strategy.slow_period
        )));
    }
    if settings.stream.channel_capacity == 0 {
        return Err(Error::Invalid("stream.channel_capacity must be at least 1".into()));
    }
    Ok(())
}
