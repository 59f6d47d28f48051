// In crates/engine/src/window.rs

use core_types::Bar;
use std::collections::VecDeque;

/// What `BarWindow::apply` did with an incoming bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new bucket started; `evicted` bars were dropped from the front to stay within capacity.
    Appended { evicted: usize },
    /// The open bar was revised in place.
    Replaced,
    /// The bar was older than the last buffered bar, or revised a bar already reported
    /// closed, and was ignored.
    Rejected,
}

impl ApplyOutcome {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApplyOutcome::Rejected)
    }
}

/// The fixed-capacity, time-ordered sequence of bars.
///
/// Invariants: `len() <= capacity()`, and bar times are strictly increasing. Only the
/// last bar is ever modified in place, and only until an update reports it closed.
#[derive(Debug, Clone)]
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
    last_closed: bool,
}

impl BarWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity + 1),
            capacity,
            last_closed: false,
        }
    }

    /// Appends a new bucket, replaces the open bar, or rejects an out-of-order bar.
    ///
    /// `is_closed` marks the stored bar final: later updates with the same time are rejected.
    pub fn apply(&mut self, bar: Bar, is_closed: bool) -> ApplyOutcome {
        let Some(last) = self.bars.back_mut() else {
            self.bars.push_back(bar);
            self.last_closed = is_closed;
            return ApplyOutcome::Appended { evicted: 0 };
        };

        if bar.time == last.time {
            if self.last_closed {
                tracing::warn!(time = bar.time, "Rejecting revision of a closed bar.");
                return ApplyOutcome::Rejected;
            }
            *last = bar;
            self.last_closed = is_closed;
            return ApplyOutcome::Replaced;
        }

        if bar.time < last.time {
            tracing::warn!(time = bar.time, last_time = last.time, "Rejecting out-of-order bar.");
            return ApplyOutcome::Rejected;
        }

        self.bars.push_back(bar);
        self.last_closed = is_closed;
        let mut evicted = 0;
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
            evicted += 1;
        }
        ApplyOutcome::Appended { evicted }
    }

    /// Replaces the whole content with `bars`, applying each in order.
    ///
    /// The newest seeded bar stays open: history may end with the bucket still in progress.
    pub fn seed(&mut self, bars: impl IntoIterator<Item = Bar>) {
        self.clear();
        for bar in bars {
            self.apply(bar, false);
        }
    }

    pub fn clear(&mut self) {
        self.bars.clear();
        self.last_closed = false;
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Bar> + ExactSizeIterator {
        self.bars.iter()
    }

    /// Copies of the most recent `n` bars (fewer if the window is shorter), oldest first.
    pub fn tail(&self, n: usize) -> Vec<Bar> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).cloned().collect()
    }

    /// A copy of the entire window, oldest first.
    pub fn snapshot(&self) -> Vec<Bar> {
        self.bars.iter().cloned().collect()
    }
}
