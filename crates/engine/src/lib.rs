// In crates/engine/src/lib.rs

pub mod controller;
pub mod signal_store;
pub mod window;

pub use controller::{ControlCommand, MarketController, has_gap};
pub use signal_store::SignalStore;
pub use window::{ApplyOutcome, BarWindow};
