//! Websocket connection state machine with auto-reconnect
//!
//! `Disconnected -> Connecting -> Connected -> (Error|Closed) -> Connecting`
//! with a fixed backoff, unless the shutdown flag is set, in which case the
//! loop terminates in `Disconnected`. Subscriptions are re-issued on every
//! `Connected` entry; they are not assumed to survive a reconnect.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{ChannelSubscription, StreamEvent, StreamSpec};

/// Fixed delay between reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

impl StreamState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Shared view of a running stream connection: state inspection and shutdown
#[derive(Debug, Clone)]
pub struct StreamHandle {
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Connected
    }

    /// Request a clean shutdown; checked before each reconnect attempt
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Connection driver for one exchange's market data stream
pub struct StreamConnection<S: StreamSpec> {
    spec: S,
    subscriptions: Vec<ChannelSubscription>,
    event_tx: mpsc::Sender<StreamEvent>,
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
    next_request_id: u64,
}

impl<S: StreamSpec> StreamConnection<S> {
    pub fn new(spec: S, event_tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            spec,
            subscriptions: Vec::new(),
            event_tx,
            state: Arc::new(AtomicU8::new(StreamState::Disconnected.as_u8())),
            shutdown: Arc::new(AtomicBool::new(false)),
            next_request_id: 1,
        }
    }

    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Register a channel subscription; issued on every (re)connect
    pub fn subscribe(&mut self, symbols: Vec<String>, channel: impl Into<String>) {
        self.subscriptions.push(ChannelSubscription {
            symbols,
            channel: channel.into(),
        });
    }

    pub fn subscriptions(&self) -> &[ChannelSubscription] {
        &self.subscriptions
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Build the control messages for all registered subscriptions,
    /// advancing the request id per message.
    fn subscription_messages(&mut self) -> Vec<String> {
        let mut messages = Vec::with_capacity(self.subscriptions.len());
        for subscription in &self.subscriptions {
            messages.push(
                self.spec
                    .subscribe_message(subscription, self.next_request_id),
            );
            self.next_request_id += 1;
        }
        messages
    }

    /// Run the connection until shutdown is requested. Each pass through the
    /// loop is one connection lifetime.
    pub async fn run(mut self) {
        let exchange = self.spec.exchange();
        loop {
            if self.is_shutdown() {
                break;
            }

            self.set_state(StreamState::Connecting);
            let url = self.spec.ws_url();
            debug!(%exchange, %url, "connecting stream");

            match connect_async(&url).await {
                Ok((ws, _)) => {
                    self.set_state(StreamState::Connected);
                    info!(%exchange, "stream connected");
                    let (mut write, mut read) = ws.split();

                    for message in self.subscription_messages() {
                        if let Err(e) = write.send(Message::Text(message)).await {
                            warn!(%exchange, "failed to send subscription: {e}");
                        }
                    }

                    while let Some(frame) = read.next().await {
                        match frame {
                            Ok(Message::Text(text)) => {
                                let mut receiver_gone = false;
                                for event in self.spec.parse_message(&text) {
                                    if self.event_tx.send(event).await.is_err() {
                                        warn!(%exchange, "event receiver dropped, shutting down stream");
                                        self.shutdown.store(true, Ordering::Release);
                                        receiver_gone = true;
                                        break;
                                    }
                                }
                                if receiver_gone {
                                    break;
                                }
                            }
                            Ok(Message::Ping(payload)) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Ok(Message::Pong(_)) | Ok(Message::Binary(_))
                            | Ok(Message::Frame(_)) => {}
                            Ok(Message::Close(frame)) => {
                                warn!(%exchange, "stream closed by peer: {frame:?}");
                                break;
                            }
                            Err(e) => {
                                warn!(%exchange, "stream error: {e}");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(%exchange, "stream connect failed: {e}");
                }
            }

            self.set_state(StreamState::Disconnected);
            if self.is_shutdown() {
                break;
            }
            debug!(%exchange, "reconnecting in {:?}", RECONNECT_DELAY);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }

        self.set_state(StreamState::Disconnected);
        info!(%exchange, "stream shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Exchange;

    /// Minimal spec echoing the Binance control message shape
    struct FakeSpec;

    impl StreamSpec for FakeSpec {
        fn exchange(&self) -> Exchange {
            Exchange::Binance
        }

        fn ws_url(&self) -> String {
            "wss://localhost:0/ws".to_string()
        }

        fn quote_channel(&self) -> &'static str {
            "bookTicker"
        }

        fn trade_channel(&self) -> &'static str {
            "aggTrade"
        }

        fn subscribe_message(
            &self,
            subscription: &ChannelSubscription,
            request_id: u64,
        ) -> String {
            let params: Vec<String> = subscription
                .symbols
                .iter()
                .map(|s| format!("{}@{}", s.to_lowercase(), subscription.channel))
                .collect();
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": params,
                "id": request_id,
            })
            .to_string()
        }

        fn parse_message(&self, _raw: &str) -> Vec<StreamEvent> {
            Vec::new()
        }
    }

    fn connection() -> StreamConnection<FakeSpec> {
        let (tx, _rx) = mpsc::channel(16);
        StreamConnection::new(FakeSpec, tx)
    }

    #[test]
    fn test_subscription_ids_increment_per_message() {
        let mut conn = connection();
        conn.subscribe(vec!["BTCUSDT".to_string()], "bookTicker");
        conn.subscribe(vec!["BTCUSDT".to_string()], "aggTrade");

        let first = conn.subscription_messages();
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("\"id\":1"));
        assert!(first[1].contains("\"id\":2"));
    }

    #[test]
    fn test_reconnect_reissues_subscriptions_with_fresh_ids() {
        // A reconnect replays the same channels; request ids keep advancing
        let mut conn = connection();
        conn.subscribe(vec!["BTCUSDT".to_string()], "bookTicker");

        let first = conn.subscription_messages();
        let second = conn.subscription_messages();
        assert!(first[0].contains("btcusdt@bookTicker"));
        assert!(second[0].contains("btcusdt@bookTicker"));
        assert!(first[0].contains("\"id\":1"));
        assert!(second[0].contains("\"id\":2"));
    }

    #[test]
    fn test_handle_reports_state_and_shutdown() {
        let conn = connection();
        let handle = conn.handle();
        assert_eq!(handle.state(), StreamState::Disconnected);
        assert!(!handle.is_connected());

        conn.set_state(StreamState::Connected);
        assert!(handle.is_connected());

        handle.shutdown();
        assert!(conn.is_shutdown());
    }
}
