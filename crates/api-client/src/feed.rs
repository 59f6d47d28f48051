// In crates/api-client/src/feed.rs

//! The two seams the orchestrator talks to: a one-shot history source and a live feed.

use crate::types::BarUpdate;
use async_trait::async_trait;
use core_types::{Bar, ConnectionState, Interval, Symbol};

/// Something the live feed reports to its single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    State(ConnectionState),
    Update(BarUpdate),
}

#[async_trait]
pub trait HistorySource {
    /// Fetches up to `count` closed bars in ascending time order.
    ///
    /// Never fails: transport or decode problems are logged and yield an empty sequence.
    async fn fetch_history(&self, symbol: &Symbol, interval: Interval, count: usize) -> Vec<Bar>;
}

#[async_trait]
pub trait LiveFeed {
    /// Opens a connection for one `(symbol, interval)` pair, tearing down any previous one.
    fn connect(&mut self, symbol: &Symbol, interval: Interval);

    /// Closes the active connection. Events still queued from it are discarded.
    /// Calling this while disconnected does nothing.
    fn disconnect(&mut self);

    fn state(&self) -> ConnectionState;

    /// The next event from the active connection, in delivery order.
    ///
    /// Returns `None` when there is no connection or the connection has ended.
    async fn next_event(&mut self) -> Option<StreamEvent>;
}
