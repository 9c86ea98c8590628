//! Reconnecting WebSocket client.

use std::sync::{Arc, Mutex, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use swarmlink_core::{Envelope, ReconnectConfig};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::{backoff::backoff_delay, error::TransportError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the layer above the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established and auth envelope sent
    Connected,
    /// Connection dropped without a local `disconnect()`
    Disconnected {
        /// Why the connection ended
        reason: String,
    },
    /// A reconnect is scheduled
    Reconnecting {
        /// Failed cycles so far (0-based)
        attempt: u32,
        /// The scheduled delay
        delay: std::time::Duration,
    },
    /// The retry budget is exhausted; manual intervention required
    GaveUp,
    /// An envelope arrived
    Message(Envelope),
}

/// WebSocket client that keeps itself connected.
///
/// On any non-user-initiated close it schedules a reconnect with
/// exponential backoff and jitter. The supervisor loop has exactly one
/// sleep site, so at most one reconnect timer can be pending at a time
/// regardless of how the connection fails.
pub struct ReconnectingClient {
    url: String,
    auth_token: String,
    config: ReconnectConfig,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<TransportEvent>,
    outbound: mpsc::UnboundedSender<Envelope>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectingClient {
    /// Create a client for `url`, authenticating with `auth_token` on every
    /// (re)connect. Does not connect until [`Self::connect`] is called.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        auth_token: impl Into<String>,
        config: ReconnectConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events,
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Whether a live, authenticated connection exists right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection events and incoming envelopes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Start the supervisor loop. Returns immediately; watch for
    /// [`TransportEvent::Connected`]. Calling again while running is a
    /// no-op.
    pub fn connect(&self) {
        let Ok(mut task) = self.task.lock() else {
            return;
        };
        if task.is_some() {
            return;
        }
        let Some(outbound_rx) = self.outbound_rx.lock().ok().and_then(|mut rx| rx.take()) else {
            return;
        };

        let supervisor = Supervisor {
            url: self.url.clone(),
            auth_token: self.auth_token.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        };
        let shutdown_rx = self.shutdown.subscribe();
        *task = Some(tokio::spawn(supervisor.run(outbound_rx, shutdown_rx)));
    }

    /// Queue an envelope for the live connection.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] without a live connection; an
    /// in-flight envelope either completes or the close surfaces through
    /// the event stream, never here.
    pub fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(envelope)
            .map_err(|_| TransportError::Closed)
    }

    /// Tear the connection down intentionally.
    ///
    /// Cancels any pending reconnect timer; no `GaveUp` event follows. This
    /// is a terminal, user-intended state, not a failure.
    pub async fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Ok(mut state) = self.state.write() {
            *state = ConnectionState::Disconnected;
        }
        info!("Transport disconnected");
    }
}

struct Supervisor {
    url: String,
    auth_token: String,
    config: ReconnectConfig,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<TransportEvent>,
}

impl Supervisor {
    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    async fn run(
        self,
        mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => {
                    let (mut sink, mut stream) = ws.split();

                    // Auth always goes out before any other traffic.
                    let auth = Envelope::auth(&self.auth_token);
                    let framed = match serde_json::to_string(&auth) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Auth envelope serialization failed");
                            break;
                        }
                    };
                    if sink.send(WsMessage::Text(framed)).await.is_ok() {
                        attempt = 0;
                        self.set_state(ConnectionState::Connected);
                        let _ = self.events.send(TransportEvent::Connected);
                        info!(url = %self.url, "Transport connected");

                        let (reason, user_requested) =
                            self.pump(&mut sink, &mut stream, &mut outbound_rx, &mut shutdown_rx)
                                .await;

                        self.set_state(ConnectionState::Disconnected);
                        if user_requested {
                            break;
                        }
                        let _ = self.events.send(TransportEvent::Disconnected { reason });
                    }
                }
                Err(e) => {
                    debug!(url = %self.url, error = %e, "Connect attempt failed");
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }
            if attempt >= self.config.max_attempts {
                self.set_state(ConnectionState::Disconnected);
                let _ = self.events.send(TransportEvent::GaveUp);
                warn!(attempts = %attempt, "Reconnect budget exhausted");
                break;
            }

            let delay = backoff_delay(attempt, &self.config);
            let _ = self
                .events
                .send(TransportEvent::Reconnecting { attempt, delay });
            debug!(attempt = %attempt, delay_ms = %delay.as_millis(), "Reconnect scheduled");

            // The only sleep site in the client: a second close event
            // cannot schedule a second timer.
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
            attempt += 1;
        }

        self.set_state(ConnectionState::Disconnected);
    }

    /// Drive a live connection until it ends. Returns the close reason and
    /// whether the close was user-requested.
    async fn pump<Sink, Stream>(
        &self,
        sink: &mut Sink,
        stream: &mut Stream,
        outbound_rx: &mut mpsc::UnboundedReceiver<Envelope>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> (String, bool)
    where
        Sink: futures_util::Sink<WsMessage> + Unpin,
        Stream: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    return ("local disconnect".to_string(), true);
                }
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(envelope) => {
                        let framed = match serde_json::to_string(&envelope) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Outbound envelope dropped");
                                continue;
                            }
                        };
                        if sink.send(WsMessage::Text(framed)).await.is_err() {
                            return ("write failed".to_string(), false);
                        }
                    }
                    None => return ("client dropped".to_string(), true),
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                let _ = self.events.send(TransportEvent::Message(envelope));
                            }
                            Err(e) => {
                                warn!(error = %e, "Malformed envelope dropped");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return ("connection closed".to_string(), false);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return (e.to_string(), false),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn fast_config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            min_delay: Duration::from_millis(1),
            max_attempts,
            jitter: 0.0,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Nothing listens on port 9; every connect fails fast.
        let client = ReconnectingClient::new("ws://127.0.0.1:9", "token", fast_config(2));
        let mut events = client.subscribe();
        client.connect();

        let mut reconnects = 0;
        loop {
            match next_event(&mut events).await {
                TransportEvent::Reconnecting { attempt, .. } => {
                    assert_eq!(attempt, reconnects);
                    reconnects += 1;
                }
                TransportEvent::GaveUp => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(reconnects, 2);
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_is_first_frame_and_messages_flow() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let envelope: Envelope =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert!(envelope.is_auth(), "first frame must be auth");
            assert_eq!(envelope.payload["token"], "secret");

            let reply = Envelope::new("event", serde_json::json!({"n": 1}));
            ws.send(WsMessage::Text(serde_json::to_string(&reply).unwrap()))
                .await
                .unwrap();

            // Hold the connection open until the client disconnects.
            while ws.next().await.is_some() {}
        });

        let client = ReconnectingClient::new(
            format!("ws://{addr}"),
            "secret",
            fast_config(3),
        );
        let mut events = client.subscribe();
        client.connect();

        assert!(matches!(next_event(&mut events).await, TransportEvent::Connected));
        assert!(client.is_connected());

        match next_event(&mut events).await {
            TransportEvent::Message(envelope) => {
                assert_eq!(envelope.kind, "event");
                assert_eq!(envelope.payload["n"], 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        client.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let config = ReconnectConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            min_delay: Duration::from_secs(60),
            max_attempts: 5,
            jitter: 0.0,
        };
        let client = ReconnectingClient::new("ws://127.0.0.1:9", "token", config);
        let mut events = client.subscribe();
        client.connect();

        // First failed cycle schedules a long timer.
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Reconnecting { attempt: 0, .. }
        ));

        // disconnect() must cancel it promptly rather than wait a minute,
        // and no GaveUp is emitted for a user-intended stop.
        tokio::time::timeout(Duration::from_secs(1), client.disconnect())
            .await
            .expect("disconnect should cancel the pending timer");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let client = ReconnectingClient::new("ws://127.0.0.1:9", "token", fast_config(1));
        let err = client
            .send(Envelope::new("message", serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: accept, then drop immediately.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await; // auth
            drop(ws);

            // Second connection: stay up.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            let envelope: Envelope =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert!(envelope.is_auth(), "auth must be resent on reconnect");
            while ws.next().await.is_some() {}
        });

        let client =
            ReconnectingClient::new(format!("ws://{addr}"), "secret", fast_config(5));
        let mut events = client.subscribe();
        client.connect();

        let mut connects = 0;
        while connects < 2 {
            match next_event(&mut events).await {
                TransportEvent::Connected => connects += 1,
                TransportEvent::Disconnected { .. } | TransportEvent::Reconnecting { .. } => {}
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(client.is_connected());

        client.disconnect().await;
        server.await.unwrap();
    }
}
