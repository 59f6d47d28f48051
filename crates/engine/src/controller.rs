// In crates/engine/src/controller.rs

use crate::signal_store::SignalStore;
use crate::window::BarWindow;
use api_client::{BarUpdate, HistorySource, LiveFeed, StreamEvent};
use app_config::MarketSettings;
use chrono::Utc;
use core_types::{Bar, ConnectionState, Interval, Signal, Symbol};
use events::{MarketEvent, WindowReset, WindowSnapshot};
use std::sync::Arc;
use strategies::types::MACrossoverSettings;
use strategies::{MACrossover, Strategy};
use tokio::sync::{broadcast, mpsc};

/// Requests the consumer-facing layer can make of a running controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Switch { symbol: Symbol, interval: Interval },
    Shutdown,
}

/// Owns the window for one `(symbol, interval)` context and is its only writer.
pub struct MarketController {
    symbol: Symbol,
    interval: Interval,
    window: BarWindow,
    signals: SignalStore,
    strategy: Box<dyn Strategy + Send + Sync>,
    history: Box<dyn HistorySource + Send + Sync>,
    feed: Box<dyn LiveFeed + Send>,
    events_tx: broadcast::Sender<MarketEvent>,
    feed_state: ConnectionState,
    feed_open: bool,
}

impl MarketController {
    pub fn new(
        market: &MarketSettings,
        strategy: MACrossoverSettings,
        history: Box<dyn HistorySource + Send + Sync>,
        feed: Box<dyn LiveFeed + Send>,
        events_tx: broadcast::Sender<MarketEvent>,
    ) -> Self {
        Self {
            symbol: market.symbol.clone(),
            interval: market.interval,
            window: BarWindow::new(market.window_capacity),
            signals: SignalStore::new(),
            strategy: Box::new(MACrossover::new(strategy)),
            history,
            feed,
            events_tx,
            feed_state: ConnectionState::Disconnected,
            feed_open: false,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Read-only view of the current window.
    pub fn window(&self) -> &BarWindow {
        &self.window
    }

    pub fn signals(&self) -> &[Signal] {
        self.signals.list()
    }

    /// The last connection state the feed reported to this controller.
    pub fn connection_state(&self) -> ConnectionState {
        self.feed_state
    }

    /// Moves the pipeline to a new context.
    ///
    /// The order is fixed: disconnect, clear, fetch history, seed, connect. Nothing from
    /// the previous connection is processed once this starts, and the new connection is
    /// not opened until the window is seeded.
    pub async fn switch_context(&mut self, symbol: Symbol, interval: Interval) {
        tracing::info!(%symbol, %interval, "Switching market context.");

        self.feed.disconnect();
        self.feed_open = false;
        self.set_feed_state(ConnectionState::Disconnected);

        self.symbol = symbol;
        self.interval = interval;
        self.window.clear();
        self.signals.clear();
        self.publish(MarketEvent::WindowReset(WindowReset {
            symbol: self.symbol.clone(),
            interval: self.interval,
        }));

        let bars = self
            .history
            .fetch_history(&self.symbol, self.interval, self.window.capacity())
            .await;
        self.window.seed(bars);
        tracing::info!(symbol = %self.symbol, bars = self.window.len(), "Window seeded from history.");
        self.publish_window();

        self.feed.connect(&self.symbol, self.interval);
        self.feed_open = true;
        self.set_feed_state(self.feed.state());
    }

    /// Restarts the current context from scratch.
    pub async fn restart(&mut self) {
        self.switch_context(self.symbol.clone(), self.interval).await;
    }

    /// Applies one event from the live feed.
    pub async fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Update(update) => {
                self.on_bar_update(update);
            }
            StreamEvent::State(state) => {
                let previous = self.set_feed_state(state);
                let resumed = matches!(previous, ConnectionState::Reconnecting { .. })
                    && state == ConnectionState::Connected;
                if resumed && has_gap(self.window.last(), self.interval, Utc::now().timestamp_millis()) {
                    self.reseed_after_gap().await;
                }
            }
        }
    }

    /// Mutates the window with one update and runs crossover detection on the result.
    ///
    /// Returns the signal if this update produced a new one.
    pub fn on_bar_update(&mut self, update: BarUpdate) -> Option<Signal> {
        let lookback = self.strategy.lookback();
        let previous = self.window.tail(lookback);

        let outcome = self.window.apply(update.bar, update.is_closed);
        if !outcome.is_mutation() {
            return None;
        }
        tracing::trace!(?outcome, closed = update.is_closed, "Applied bar update.");
        self.publish_window();

        let current = self.window.tail(lookback);
        let signal = self.strategy.assess(&previous, &current)?;
        if !self.signals.add(signal.clone()) {
            return None;
        }

        tracing::info!(
            symbol = %self.symbol,
            strategy = self.strategy.name(),
            direction = %signal.direction,
            price = %signal.price,
            time = signal.time,
            "Crossover detected."
        );
        self.publish(MarketEvent::SignalEmitted(signal.clone()));
        Some(signal)
    }

    /// The single consuming loop. Commands and feed events are handled one at a time, so
    /// a window mutation always finishes before the next event is looked at.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ControlCommand>) -> anyhow::Result<()> {
        tracing::info!(symbol = %self.symbol, interval = %self.interval, "Starting market controller.");
        self.restart().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ControlCommand::Switch { symbol, interval }) => {
                        self.switch_context(symbol, interval).await;
                    }
                    Some(ControlCommand::Shutdown) | None => break,
                },
                event = self.feed.next_event(), if self.feed_open => match event {
                    Some(event) => self.handle_stream_event(event).await,
                    None => {
                        tracing::warn!(symbol = %self.symbol, "Live feed ended. Waiting for a context switch.");
                        self.feed_open = false;
                        self.set_feed_state(ConnectionState::Disconnected);
                    }
                },
            }
        }

        self.feed.disconnect();
        self.set_feed_state(ConnectionState::Disconnected);
        tracing::info!("Market controller stopped.");
        Ok(())
    }

    /// Replaces the window with fresh history after the feed came back from an outage.
    /// Signals already emitted are kept.
    async fn reseed_after_gap(&mut self) {
        tracing::warn!(symbol = %self.symbol, interval = %self.interval, "Stream resumed after a gap. Re-seeding window.");
        let bars = self
            .history
            .fetch_history(&self.symbol, self.interval, self.window.capacity())
            .await;
        if bars.is_empty() {
            tracing::warn!(symbol = %self.symbol, "Re-seed returned no bars. Keeping the current window.");
            return;
        }
        self.window.seed(bars);
        self.publish_window();
    }

    fn set_feed_state(&mut self, state: ConnectionState) -> ConnectionState {
        let previous = std::mem::replace(&mut self.feed_state, state);
        if previous != state {
            tracing::info!(symbol = %self.symbol, ?previous, current = ?state, "Connection state changed.");
            self.publish(MarketEvent::ConnectionChanged(state));
        }
        previous
    }

    fn publish_window(&self) {
        self.publish(MarketEvent::WindowUpdated(WindowSnapshot {
            symbol: self.symbol.clone(),
            interval: self.interval,
            bars: Arc::new(self.window.snapshot()),
            updated_at: Utc::now(),
        }));
    }

    fn publish(&self, event: MarketEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}

/// True when the last buffered bar started more than one interval before `now_ms`, or when
/// there is no bar at all.
pub fn has_gap(last: Option<&Bar>, interval: Interval, now_ms: i64) -> bool {
    let Some(last) = last else {
        return true;
    };
    now_ms - last.time > interval.duration_ms()
}
