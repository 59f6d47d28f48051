// --- Consumer-facing notifications for an external UI ---

use chrono::{DateTime, Utc};
use core_types::{Bar, ConnectionState, Interval, Signal, Symbol};
use serde::Serialize;
use std::sync::Arc;

/// The window was cleared for a new instrument/interval context.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReset {
    pub symbol: Symbol,
    pub interval: Interval,
}

/// An immutable copy of the window taken right after a mutation.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub symbol: Symbol,
    pub interval: Interval,
    pub bars: Arc<Vec<Bar>>,
    pub updated_at: DateTime<Utc>,
}

/// The top-level notification enum.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum MarketEvent {
    WindowReset(WindowReset),
    WindowUpdated(WindowSnapshot),
    SignalEmitted(Signal),
    ConnectionChanged(ConnectionState),
}
