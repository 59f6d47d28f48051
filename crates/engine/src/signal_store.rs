// In crates/engine/src/signal_store.rs

use core_types::{CrossDirection, Signal};
use std::collections::HashSet;

/// Emitted signals in insertion order, de-duplicated by `(time, direction)`.
#[derive(Debug, Default, Clone)]
pub struct SignalStore {
    signals: Vec<Signal>,
    seen: HashSet<(i64, CrossDirection)>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the signal was new. Duplicates are ignored.
    pub fn add(&mut self, signal: Signal) -> bool {
        if !self.seen.insert(signal.key()) {
            return false;
        }
        self.signals.push(signal);
        true
    }

    pub fn list(&self) -> &[Signal] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn clear(&mut self) {
        self.signals.clear();
        self.seen.clear();
    }
}
