// In crates/api-client/src/live_connector.rs

use crate::feed::{LiveFeed, StreamEvent};
use crate::types::{BarUpdate, WsKlineEvent};
use crate::{Error, Result};
use app_config::types::{BinanceSettings, ReconnectSettings, StreamSettings};
use async_trait::async_trait;
use core_types::{ConnectionState, ContractType, Interval, Symbol};
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const KLINE_EVENT_TYPES: [&str; 2] = ["continuous_kline", "kline"];

/// The socket task's handle and the receiving end of its event channel.
struct Session {
    stream_name: String,
    task: JoinHandle<()>,
    events: mpsc::Receiver<StreamEvent>,
}

/// A live continuous-kline connection scoped to one `(symbol, interval)` pair.
///
/// A spawned task owns the socket and pushes decoded updates into a bounded channel;
/// the owner pulls them one at a time through [`StreamClient::next_event`]. State changes
/// travel through the same channel, so they are observed in order with the updates.
pub struct StreamClient {
    ws_base_url: String,
    contract_type: ContractType,
    channel_capacity: usize,
    reconnect: ReconnectSettings,
    state_tx: watch::Sender<ConnectionState>,
    session: Option<Session>,
}

impl StreamClient {
    pub fn new(binance: &BinanceSettings, stream: &StreamSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            ws_base_url: binance.ws_base_url.trim_end_matches('/').to_string(),
            contract_type: binance.contract_type,
            channel_capacity: stream.channel_capacity.max(1),
            reconnect: stream.reconnect.clone(),
            state_tx,
            session: None,
        }
    }

    /// `"{pair}_{contract}@continuousKline_{interval}"`, lowercase.
    pub fn stream_name(&self, symbol: &Symbol, interval: Interval) -> String {
        format!(
            "{}_{}@continuousKline_{}",
            symbol.to_stream_name(),
            self.contract_type.as_stream_name(),
            interval
        )
    }

    pub fn stream_url(&self, symbol: &Symbol, interval: Interval) -> String {
        format!("{}/ws/{}", self.ws_base_url, self.stream_name(symbol, interval))
    }

    /// Opens a connection, first tearing down any existing one.
    ///
    /// Returns immediately; progress is reported as `StreamEvent::State` events.
    pub fn connect(&mut self, symbol: &Symbol, interval: Interval) {
        self.disconnect();

        let stream_name = self.stream_name(symbol, interval);
        let url = self.stream_url(symbol, interval);
        let (events_tx, events_rx) = mpsc::channel(self.channel_capacity);
        self.state_tx.send_replace(ConnectionState::Connecting);

        let task = tokio::spawn(run_connection(url, events_tx, self.reconnect.clone()));
        tracing::info!(stream = %stream_name, "Live stream task started.");

        self.session = Some(Session {
            stream_name,
            task,
            events: events_rx,
        });
    }

    /// Closes the active connection, if any.
    ///
    /// The receiver is dropped before returning, so nothing the old connection queued
    /// can be observed afterwards.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
            drop(session.events);
            tracing::info!(stream = %session.stream_name, "Live stream disconnected.");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// A receiver that observes every state the consumer has processed.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let session = self.session.as_mut()?;
        match session.events.recv().await {
            Some(event) => {
                if let StreamEvent::State(state) = &event {
                    self.state_tx.send_replace(*state);
                }
                Some(event)
            }
            None => {
                // The socket task ended on its own.
                self.session = None;
                self.state_tx.send_replace(ConnectionState::Disconnected);
                None
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

#[async_trait]
impl LiveFeed for StreamClient {
    fn connect(&mut self, symbol: &Symbol, interval: Interval) {
        StreamClient::connect(self, symbol, interval);
    }

    fn disconnect(&mut self) {
        StreamClient::disconnect(self);
    }

    fn state(&self) -> ConnectionState {
        StreamClient::state(self)
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        StreamClient::next_event(self).await
    }
}

/// Capped exponential backoff for the given 1-based reconnect attempt.
pub fn backoff_delay(policy: &ReconnectSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay_ms = policy
        .initial_backoff_ms
        .saturating_mul(1_u64 << exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(delay_ms)
}

/// Decodes one text frame.
///
/// `Ok(None)` means the frame is valid but not a kline event (e.g. a subscription ack);
/// `Err` means the frame could not be decoded at all. Combined-stream frames
/// (`{"stream": ..., "data": {...}}`) are unwrapped.
pub fn decode_frame(text: &str) -> Result<Option<BarUpdate>> {
    let value = match serde_json::from_str::<Value>(text)? {
        Value::Object(mut wrapper) if wrapper.contains_key("data") => {
            wrapper.remove("data").unwrap_or_default()
        }
        other => other,
    };

    let event_type = value.get("e").and_then(Value::as_str);
    match event_type {
        Some(kind) if KLINE_EVENT_TYPES.contains(&kind) => {}
        Some(_) | None => return Ok(None),
    }

    let event: WsKlineEvent = serde_json::from_value(value)?;
    Ok(Some(event.kline.to_update()))
}

/// Why the read loop of one socket stopped.
enum PumpEnd {
    ConnectionLost,
    ConsumerGone,
}

/// The socket task: connect, forward decoded frames, and retry per policy.
async fn run_connection(
    url: String,
    events: mpsc::Sender<StreamEvent>,
    policy: ReconnectSettings,
) {
    let mut attempt: u32 = 0;
    if events.send(StreamEvent::State(ConnectionState::Connecting)).await.is_err() {
        return;
    }
    loop {
        tracing::info!(url = %url, attempt, "Connecting to WebSocket stream...");
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                tracing::info!(url = %url, "WebSocket connection successful.");
                attempt = 0;
                if events.send(StreamEvent::State(ConnectionState::Connected)).await.is_err() {
                    return;
                }
                match pump(ws_stream, &events).await {
                    PumpEnd::ConsumerGone => return,
                    PumpEnd::ConnectionLost => {}
                }
            }
            Err(e) => {
                tracing::error!(url = %url, error = %Error::from(e), "WebSocket connection failed.");
            }
        }

        attempt = attempt.saturating_add(1);
        if attempt > policy.max_attempts {
            if policy.max_attempts > 0 {
                tracing::error!(url = %url, attempts = policy.max_attempts, "Giving up on the live stream.");
            }
            let _ = events.send(StreamEvent::State(ConnectionState::Disconnected)).await;
            return;
        }

        let delay = backoff_delay(&policy, attempt);
        tracing::warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "Live stream dropped. Reconnecting after backoff.");
        if events.send(StreamEvent::State(ConnectionState::Reconnecting { attempt })).await.is_err() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

async fn pump<S>(ws_stream: S, events: &mpsc::Sender<StreamEvent>) -> PumpEnd
where
    S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut read = ws_stream.fuse();

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match decode_frame(text.as_str()) {
                Ok(Some(update)) => {
                    tracing::debug!(time = update.bar.time, is_closed = update.is_closed, "Kline update received.");
                    if events.send(StreamEvent::Update(update)).await.is_err() {
                        return PumpEnd::ConsumerGone;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable stream message.");
                }
            },
            Ok(Message::Close(frame)) => {
                tracing::warn!(?frame, "WebSocket closed by server.");
                return PumpEnd::ConnectionLost;
            }
            // Pings are answered by tungstenite itself.
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Error reading from WebSocket.");
                return PumpEnd::ConnectionLost;
            }
        }
    }
    PumpEnd::ConnectionLost
}
