// In crates/strategies/src/indicators.rs

use core_types::Bar;
use rust_decimal::Decimal;

/// Arithmetic mean of `close` over the last `period` bars of `window`.
///
/// Returns `None` when the window holds fewer than `period` bars (or `period` is zero):
/// insufficient history is not the same thing as an average of zero. An overflowing sum
/// is also `None`. The mean is recomputed from scratch on every call.
pub fn simple_moving_average(window: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || window.len() < period {
        return None;
    }
    let sum = window[window.len() - period..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, bar| acc.checked_add(bar.close))?;
    sum.checked_div(Decimal::from(period))
}
