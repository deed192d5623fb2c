//! Delivery channel adapter.
//!
//! Keeps a push connection open when one is configured and falls back to
//! polling the backend whenever push is disabled or down. Everything it
//! receives is forwarded as a [`WireEvent`]; it never touches the store.
//! Transport failures are logged and retried, never surfaced to callers.

mod backoff;
mod poller;
mod transport;
mod websocket;

pub use backoff::BackoffConfig;
pub use transport::{PushStream, PushTransport};
pub use websocket::WebSocketTransport;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::NotificationBackend;
use crate::events::{ChannelState, WireEvent};
use poller::Poller;

/// Who the push connection is opened for.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Delivery channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Use the push transport when one is available.
    pub push_enabled: bool,
    /// WebSocket endpoint for push delivery.
    #[serde(default)]
    pub push_url: Option<String>,
    /// Seconds between fallback polls.
    pub poll_interval_secs: u64,
    /// Reconnect backoff for the push transport.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            push_enabled: false,
            push_url: None,
            poll_interval_secs: 30,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ChannelAdapter {
    config: ChannelConfig,
    transport: Option<Arc<dyn PushTransport>>,
    backend: Arc<dyn NotificationBackend>,
    event_tx: mpsc::UnboundedSender<WireEvent>,
    cursor_rx: watch::Receiver<Option<DateTime<Utc>>>,
    running: Mutex<Option<RunningLoop>>,
}

impl ChannelAdapter {
    /// `cursor_rx` tracks the newest `created_at` the client has stored; it
    /// drives `since` for polls and the resume token for push handshakes.
    pub fn new(
        config: ChannelConfig,
        transport: Option<Arc<dyn PushTransport>>,
        backend: Arc<dyn NotificationBackend>,
        event_tx: mpsc::UnboundedSender<WireEvent>,
        cursor_rx: watch::Receiver<Option<DateTime<Utc>>>,
    ) -> Self {
        Self {
            config,
            transport,
            backend,
            event_tx,
            cursor_rx,
            running: Mutex::new(None),
        }
    }

    /// Start the delivery loop for `session`.
    ///
    /// A loop that is already running is cancelled and replaced.
    pub fn connect(&self, session: SessionIdentity) {
        let cancel = CancellationToken::new();
        let transport = match (&self.transport, self.config.push_enabled) {
            (Some(transport), true) => Some(transport.clone()),
            (None, true) => {
                warn!("Push enabled but no push transport configured; polling only");
                None
            }
            (_, false) => None,
        };

        let delivery = DeliveryLoop {
            session,
            config: self.config.clone(),
            transport,
            poller: Poller::new(self.backend.clone(), self.cursor_rx.clone()),
            event_tx: self.event_tx.clone(),
            state: ChannelState::Disconnected,
            last_poll: None,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(delivery.run());

        if let Some(previous) = self.running.lock().replace(RunningLoop { cancel, handle }) {
            debug!("Replacing running delivery loop");
            previous.cancel.cancel();
        }
    }

    /// Stop the delivery loop, any pending reconnect wait and the poll timer.
    /// Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await
            && e.is_panic()
        {
            warn!(error = %e, "Delivery loop panicked");
        }
        info!("Delivery channel disconnected");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for ChannelAdapter {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

struct DeliveryLoop {
    session: SessionIdentity,
    config: ChannelConfig,
    transport: Option<Arc<dyn PushTransport>>,
    poller: Poller,
    event_tx: mpsc::UnboundedSender<WireEvent>,
    state: ChannelState,
    last_poll: Option<Instant>,
    cancel: CancellationToken,
}

impl DeliveryLoop {
    async fn run(mut self) {
        match self.transport.clone() {
            Some(transport) => self.run_push(transport).await,
            None => self.run_polling().await,
        }
        self.set_state(ChannelState::Disconnected);
        debug!(user_id = %self.session.user_id, "Delivery loop stopped");
    }

    async fn run_polling(&mut self) {
        info!(
            interval_secs = self.config.poll_interval().as_secs(),
            "Delivering notifications by polling"
        );
        while self.poll_for(self.config.poll_interval()).await {}
    }

    async fn run_push(&mut self, transport: Arc<dyn PushTransport>) {
        let cancel = self.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ChannelState::Connecting);
            let resume_token = self
                .poller
                .cursor()
                .map(|cursor| cursor.to_rfc3339_opts(SecondsFormat::Millis, true));

            let opened = tokio::select! {
                _ = cancel.cancelled() => return,
                opened = transport.open(&self.session, resume_token) => opened,
            };

            match opened {
                Ok(stream) => {
                    attempt = 0;
                    self.set_state(ChannelState::Connected);
                    if self.pump(stream).await.is_break() {
                        return;
                    }
                }
                Err(e) => warn!(attempt, error = %e, "Push connection failed"),
            }
            self.set_state(ChannelState::Disconnected);

            attempt = attempt.saturating_add(1);
            let delay = self.config.backoff.delay_for_attempt(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
            if !self.poll_for(delay).await {
                return;
            }
        }
    }

    /// Forward frames until the connection ends. `Break` means stop entirely.
    async fn pump(&mut self, mut stream: PushStream) -> ControlFlow<()> {
        let cancel = self.cancel.clone();
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return ControlFlow::Break(()),
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(text)) => match WireEvent::parse(&text) {
                    Ok(event) => {
                        if !self.emit(event) {
                            return ControlFlow::Break(());
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable push frame"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Push connection broke");
                    return ControlFlow::Continue(());
                }
                None => {
                    info!("Push connection closed by server");
                    return ControlFlow::Continue(());
                }
            }
        }
    }

    /// Keep polling on the configured interval for `wait`.
    ///
    /// Returns `false` when cancelled or when nobody is listening anymore.
    async fn poll_for(&mut self, wait: Duration) -> bool {
        let cancel = self.cancel.clone();
        let interval = self.config.poll_interval();
        let deadline = Instant::now() + wait;

        loop {
            let due = self.last_poll.is_none_or(|at| at.elapsed() >= interval);
            if due {
                self.last_poll = Some(Instant::now());
                let alive = tokio::select! {
                    _ = cancel.cancelled() => return false,
                    alive = self.poller.poll_into(&self.event_tx) => alive,
                };
                if !alive {
                    return false;
                }
            }

            let next_poll = self.last_poll.map_or(deadline, |at| at + interval);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(next_poll.min(deadline)) => {}
            }
            if Instant::now() >= deadline {
                return true;
            }
        }
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Channel state changed");
        self.state = state;
        self.emit(WireEvent::channel_state(state));
    }

    fn emit(&self, event: WireEvent) -> bool {
        self.event_tx.send(event).is_ok()
    }
}
