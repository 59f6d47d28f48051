// In crates/strategies/src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MACrossoverSettings {
    /// Bars in the fast simple moving average.
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    /// Bars in the slow simple moving average.
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
}

impl Default for MACrossoverSettings {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
        }
    }
}

fn default_fast_period() -> usize { 7 }
fn default_slow_period() -> usize { 25 }
