use api_client::{BarUpdate, HistorySource, LiveFeed, StreamEvent};
use app_config::MarketSettings;
use async_trait::async_trait;
use core_types::{Bar, ConnectionState, CrossDirection, Interval, Symbol};
use engine::{ControlCommand, MarketController};
use events::MarketEvent;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strategies::types::MACrossoverSettings;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const MINUTE: i64 = 60_000;

fn bar(time: i64, close: Decimal) -> Bar {
    Bar {
        time,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1),
    }
}

fn flat_history(count: i64, close: Decimal) -> Vec<Bar> {
    (1..=count).map(|i| bar(i * MINUTE, close)).collect()
}

fn update(time: i64, close: Decimal, is_closed: bool) -> StreamEvent {
    StreamEvent::Update(BarUpdate {
        bar: bar(time, close),
        is_closed,
    })
}

/// Ordered record of what the fakes were asked to do.
type CallLog = Arc<Mutex<Vec<String>>>;

struct FakeHistory {
    bars: Vec<Bar>,
    log: CallLog,
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn fetch_history(&self, symbol: &Symbol, interval: Interval, count: usize) -> Vec<Bar> {
        self.log
            .lock()
            .unwrap()
            .push(format!("fetch {symbol} {interval} {count}"));
        let skip = self.bars.len().saturating_sub(count);
        self.bars[skip..].to_vec()
    }
}

#[derive(Default)]
struct FeedInner {
    /// Events the next `connect` will deliver.
    script: VecDeque<StreamEvent>,
    queue: VecDeque<StreamEvent>,
    state: ConnectionState,
}

struct FakeFeed {
    inner: Arc<Mutex<FeedInner>>,
    log: CallLog,
}

#[async_trait]
impl LiveFeed for FakeFeed {
    fn connect(&mut self, symbol: &Symbol, interval: Interval) {
        self.log.lock().unwrap().push(format!("connect {symbol} {interval}"));
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.queue = std::mem::take(&mut inner.script);
        inner.state = ConnectionState::Connected;
    }

    fn disconnect(&mut self) {
        self.log.lock().unwrap().push("disconnect".to_string());
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        self.inner.lock().unwrap().queue.pop_front()
    }
}

struct Harness {
    controller: MarketController,
    feed: Arc<Mutex<FeedInner>>,
    log: CallLog,
    events: broadcast::Receiver<MarketEvent>,
}

fn harness(history: Vec<Bar>, capacity: usize, fast: usize, slow: usize) -> Harness {
    let log: CallLog = Arc::default();
    let feed: Arc<Mutex<FeedInner>> = Arc::default();
    let (events_tx, events) = broadcast::channel(1024);
    let market = MarketSettings {
        symbol: Symbol::new("BTCUSDT").unwrap(),
        interval: Interval::OneMinute,
        window_capacity: capacity,
    };
    let controller = MarketController::new(
        &market,
        MACrossoverSettings {
            fast_period: fast,
            slow_period: slow,
        },
        Box::new(FakeHistory { bars: history, log: log.clone() }),
        Box::new(FakeFeed { inner: feed.clone(), log: log.clone() }),
        events_tx,
    );
    Harness { controller, feed, log, events }
}

fn drain(events: &mut broadcast::Receiver<MarketEvent>) -> Vec<MarketEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn failing_history_leaves_the_window_empty_and_still_connects() {
    let mut h = harness(Vec::new(), 180, 7, 25);

    h.controller.restart().await;

    assert!(h.controller.window().is_empty());
    assert!(h.controller.signals().is_empty());
    assert_eq!(h.controller.connection_state(), ConnectionState::Connected);
    assert_eq!(
        *h.log.lock().unwrap(),
        vec!["disconnect", "fetch BTCUSDT 1m 180", "connect BTCUSDT 1m"]
    );
}

#[tokio::test]
async fn flat_history_then_a_jump_emits_exactly_one_up_cross() {
    let mut h = harness(flat_history(7, dec!(10)), 180, 3, 5);
    h.controller.restart().await;
    assert_eq!(h.controller.window().len(), 7);
    assert!(h.controller.signals().is_empty(), "seeding never emits signals");
    drain(&mut h.events);

    let signal = h
        .controller
        .on_bar_update(BarUpdate { bar: bar(8 * MINUTE, dec!(20)), is_closed: false })
        .expect("the jump should cross");

    assert_eq!(signal.direction, CrossDirection::UpCross);
    assert_eq!(signal.price, dec!(20));
    assert_eq!(signal.time, 8 * MINUTE);
    assert_eq!(h.controller.signals(), &[signal.clone()]);

    let events = drain(&mut h.events);
    assert!(matches!(events.first(), Some(MarketEvent::WindowUpdated(s)) if s.bars.len() == 8));
    assert!(matches!(events.last(), Some(MarketEvent::SignalEmitted(s)) if *s == signal));
}

#[tokio::test]
async fn replaying_the_same_state_does_not_signal_twice() {
    let mut h = harness(flat_history(7, dec!(10)), 180, 3, 5);
    h.controller.restart().await;

    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), false)).await;
    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), false)).await;
    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), true)).await;

    assert_eq!(h.controller.signals().len(), 1);
    assert_eq!(h.controller.window().len(), 8);
}

#[tokio::test]
async fn open_bar_revision_replaces_the_last_bar() {
    let mut h = harness(flat_history(5, dec!(10)), 180, 3, 5);
    h.controller.restart().await;

    h.controller.handle_stream_event(update(5 * MINUTE, dec!(11.5), false)).await;

    let window = h.controller.window();
    assert_eq!(window.len(), 5);
    assert_eq!(window.last().unwrap().time, 5 * MINUTE);
    assert_eq!(window.last().unwrap().close, dec!(11.5));
}

#[tokio::test]
async fn revision_after_close_is_ignored() {
    let mut h = harness(flat_history(7, dec!(10)), 180, 3, 5);
    h.controller.restart().await;

    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), true)).await;
    assert_eq!(h.controller.signals().len(), 1);
    drain(&mut h.events);

    // Would drag the fast average back under the slow one if it were applied.
    let signal = h
        .controller
        .on_bar_update(BarUpdate { bar: bar(8 * MINUTE, dec!(1)), is_closed: false });

    assert_eq!(signal, None);
    assert_eq!(h.controller.window().last().unwrap().close, dec!(20));
    assert_eq!(h.controller.signals().len(), 1);
    assert!(drain(&mut h.events).is_empty());

    // The next bucket is still accepted.
    h.controller.handle_stream_event(update(9 * MINUTE, dec!(20), false)).await;
    assert_eq!(h.controller.window().len(), 9);
}

#[tokio::test]
async fn out_of_order_update_is_rejected_without_a_signal() {
    let mut h = harness(flat_history(7, dec!(10)), 180, 3, 5);
    h.controller.restart().await;
    let before = h.controller.window().snapshot();
    drain(&mut h.events);

    // Would be an up-cross if it were accepted.
    let signal = h
        .controller
        .on_bar_update(BarUpdate { bar: bar(3 * MINUTE, dec!(50)), is_closed: true });

    assert_eq!(signal, None);
    assert_eq!(h.controller.window().snapshot(), before);
    assert!(h.controller.signals().is_empty());
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn window_stays_at_capacity_while_streaming() {
    let mut h = harness(flat_history(4, dec!(10)), 4, 2, 3);
    h.controller.restart().await;

    for i in 5..=9 {
        h.controller.handle_stream_event(update(i * MINUTE, dec!(10), true)).await;
    }

    let times: Vec<i64> = h.controller.window().iter().map(|b| b.time).collect();
    assert_eq!(times, vec![6 * MINUTE, 7 * MINUTE, 8 * MINUTE, 9 * MINUTE]);
}

#[tokio::test]
async fn switching_context_clears_state_and_drops_late_messages() {
    let mut h = harness(flat_history(7, dec!(10)), 50, 3, 5);
    h.controller.restart().await;
    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), false)).await;
    assert_eq!(h.controller.signals().len(), 1);

    // Left over from the first connection.
    h.feed.lock().unwrap().queue.push_back(update(9 * MINUTE, dec!(30), false));
    h.log.lock().unwrap().clear();
    drain(&mut h.events);

    let eth = Symbol::new("ethusdt").unwrap();
    h.controller.switch_context(eth.clone(), Interval::FiveMinutes).await;

    assert_eq!(h.controller.symbol(), &eth);
    assert_eq!(h.controller.interval(), Interval::FiveMinutes);
    assert!(h.controller.signals().is_empty());
    assert_eq!(h.controller.window().len(), 7);
    assert!(h.feed.lock().unwrap().queue.is_empty());
    assert_eq!(
        *h.log.lock().unwrap(),
        vec!["disconnect", "fetch ETHUSDT 5m 50", "connect ETHUSDT 5m"]
    );

    let events = drain(&mut h.events);
    let reset_at = events
        .iter()
        .position(|e| matches!(e, MarketEvent::WindowReset(r) if r.symbol == eth))
        .expect("a reset notification");
    let seeded_at = events
        .iter()
        .position(|e| matches!(e, MarketEvent::WindowUpdated(s) if s.symbol == eth))
        .expect("a seeded snapshot");
    assert!(reset_at < seeded_at);
}

#[tokio::test]
async fn resuming_after_a_gap_reseeds_and_keeps_signals() {
    let mut h = harness(flat_history(7, dec!(10)), 50, 3, 5);
    h.controller.restart().await;
    h.controller.handle_stream_event(update(8 * MINUTE, dec!(20), false)).await;
    assert_eq!(h.controller.window().len(), 8);
    h.log.lock().unwrap().clear();

    h.controller
        .handle_stream_event(StreamEvent::State(ConnectionState::Reconnecting { attempt: 1 }))
        .await;
    assert_eq!(
        h.controller.connection_state(),
        ConnectionState::Reconnecting { attempt: 1 }
    );
    h.controller
        .handle_stream_event(StreamEvent::State(ConnectionState::Connected))
        .await;

    assert_eq!(*h.log.lock().unwrap(), vec!["fetch BTCUSDT 1m 50"]);
    assert_eq!(h.controller.window().len(), 7, "window replaced by fresh history");
    assert_eq!(h.controller.signals().len(), 1);
    assert_eq!(h.controller.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn plain_connect_does_not_reseed() {
    let mut h = harness(flat_history(7, dec!(10)), 50, 3, 5);
    h.controller.restart().await;
    h.log.lock().unwrap().clear();

    h.controller
        .handle_stream_event(StreamEvent::State(ConnectionState::Connecting))
        .await;
    h.controller
        .handle_stream_event(StreamEvent::State(ConnectionState::Connected))
        .await;

    assert!(h.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_loop_processes_feed_and_commands_in_order() {
    let h = harness(flat_history(7, dec!(10)), 50, 3, 5);
    let Harness { mut controller, feed, mut events, .. } = h;
    {
        let mut inner = feed.lock().unwrap();
        inner.script.push_back(update(8 * MINUTE, dec!(20), false));
        inner.script.push_back(update(8 * MINUTE, dec!(20), true));
    }

    let (commands_tx, commands_rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        controller.run(commands_rx).await.unwrap();
        controller
    });

    let wait = Duration::from_secs(5);
    let signal = timeout(wait, async {
        loop {
            if let MarketEvent::SignalEmitted(signal) = events.recv().await.unwrap() {
                return signal;
            }
        }
    })
    .await
    .expect("signal was not emitted");
    assert_eq!(signal.direction, CrossDirection::UpCross);

    let sol = Symbol::new("SOLUSDT").unwrap();
    commands_tx
        .send(ControlCommand::Switch { symbol: sol.clone(), interval: Interval::OneHour })
        .await
        .unwrap();
    timeout(wait, async {
        loop {
            if let MarketEvent::WindowReset(reset) = events.recv().await.unwrap() {
                if reset.symbol == sol {
                    return;
                }
            }
        }
    })
    .await
    .expect("switch was not processed");

    commands_tx.send(ControlCommand::Shutdown).await.unwrap();
    let controller = timeout(wait, handle).await.unwrap().unwrap();

    assert_eq!(controller.symbol(), &sol);
    assert!(controller.signals().is_empty());
    assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
}
