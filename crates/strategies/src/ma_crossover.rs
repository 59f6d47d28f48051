// In crates/strategies/src/ma_crossover.rs

use crate::indicators::simple_moving_average;
use crate::types::MACrossoverSettings;
use crate::Strategy;
use core_types::{Bar, CrossDirection, Signal};

/// Compares fast/slow simple moving averages before and after one window mutation.
///
/// A previous-step tie (`fast == slow`) counts as sitting on the average and is resolved
/// toward whichever side the current step strictly lands on, so a move off a tie emits.
/// Returns `None` while either window is too short for either average.
pub fn detect(
    previous: &[Bar],
    current: &[Bar],
    fast_period: usize,
    slow_period: usize,
) -> Option<Signal> {
    let fast_prev = simple_moving_average(previous, fast_period)?;
    let slow_prev = simple_moving_average(previous, slow_period)?;
    let fast_curr = simple_moving_average(current, fast_period)?;
    let slow_curr = simple_moving_average(current, slow_period)?;

    let direction = if fast_prev <= slow_prev && fast_curr > slow_curr {
        // Bullish crossover: fast line just crossed above the slow line.
        CrossDirection::UpCross
    } else if fast_prev >= slow_prev && fast_curr < slow_curr {
        // Bearish crossover: fast line just crossed below the slow line.
        CrossDirection::DownCross
    } else {
        return None;
    };

    let trigger = current.last()?;
    Some(Signal::new(trigger.time, direction, trigger.close))
}

/// The moving-average crossover detector.
#[derive(Debug, Clone)]
pub struct MACrossover {
    settings: MACrossoverSettings,
}

impl MACrossover {
    /// Creates a new `MACrossover` strategy instance from its settings.
    pub fn new(settings: MACrossoverSettings) -> Self {
        Self { settings }
    }
}

impl Strategy for MACrossover {
    fn name(&self) -> &'static str {
        "MACrossover"
    }

    fn lookback(&self) -> usize {
        self.settings.fast_period.max(self.settings.slow_period)
    }

    fn assess(&self, previous: &[Bar], current: &[Bar]) -> Option<Signal> {
        detect(
            previous,
            current,
            self.settings.fast_period,
            self.settings.slow_period,
        )
    }
}
