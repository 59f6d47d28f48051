// In crates/strategies/src/lib.rs

use core_types::{Bar, Signal};
pub mod indicators;
pub mod ma_crossover;
pub mod types;

pub use ma_crossover::{MACrossover, detect};

/// The universal interface for a signal detector.
///
/// A strategy looks at the window as it was before one mutation and as it is after it,
/// and reports at most one `Signal` for that step. Implementations carry no state between
/// calls, so replaying the same pair of windows always gives the same answer.
pub trait Strategy {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    /// The fewest trailing bars `assess` needs to see from each window.
    fn lookback(&self) -> usize;

    fn assess(&self, previous: &[Bar], current: &[Bar]) -> Option<Signal>;
}
