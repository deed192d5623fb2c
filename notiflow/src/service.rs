//! Session-scoped notification service.
//!
//! [`NotificationCenter`] owns every component for one signed-in session:
//! the store, the toast queue, the action dispatcher, the reconciler task and
//! the delivery channel. It is started once and shut down once; a new session
//! gets a new center.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{HttpBackend, NotificationBackend};
use crate::channel::{ChannelAdapter, PushTransport, SessionIdentity, WebSocketTransport};
use crate::config::NotiflowConfig;
use crate::dispatcher::{ActionDispatcher, ActionOutcome, LoggingNavigator, Navigator};
use crate::events::{ChannelState, WireEvent};
use crate::model::Notification;
use crate::reconciler::{Reconciler, ReconcilerStats};
use crate::store::{NotificationStore, SharedStore};
use crate::toast::{ToastOptions, ToastQueue, ToastSnapshot};
use crate::{Error, Result};

/// Point-in-time view of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationStats {
    /// Notifications held in the store.
    pub stored: usize,
    /// Current unread counter.
    pub unread: usize,
    /// Toasts currently rendered.
    pub visible_toasts: usize,
    /// Toasts hidden behind "+N more".
    pub overflow_toasts: usize,
    /// Inbound events dropped as malformed.
    pub malformed_dropped: u64,
    /// Re-delivered notifications that were ignored.
    pub duplicates_ignored: u64,
    /// Successful resyncs after (re)connecting.
    pub resyncs: u64,
    pub channel_state: ChannelState,
}

struct Session {
    channel: ChannelAdapter,
    reconciler_task: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

pub struct NotificationCenter {
    config: NotiflowConfig,
    store: SharedStore,
    toasts: ToastQueue,
    dispatcher: ActionDispatcher,
    backend: Arc<dyn NotificationBackend>,
    transport: Option<Arc<dyn PushTransport>>,
    event_tx: mpsc::UnboundedSender<WireEvent>,
    state_rx: watch::Receiver<ChannelState>,
    reconciler_stats: Arc<ReconcilerStats>,
    /// Taken by `start`.
    pending: Mutex<Option<(Reconciler, mpsc::UnboundedReceiver<WireEvent>)>>,
    session: Mutex<Option<Session>>,
}

impl NotificationCenter {
    pub fn new(
        config: NotiflowConfig,
        backend: Arc<dyn NotificationBackend>,
        transport: Option<Arc<dyn PushTransport>>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = NotificationStore::shared();
        let dispatcher = ActionDispatcher::new(store.clone(), backend.clone(), navigator);
        let toasts = ToastQueue::new(config.toast.clone(), dispatcher.clone());
        let reconciler = Reconciler::new(store.clone(), toasts.clone(), backend.clone());
        let state_rx = reconciler.subscribe_state();
        let reconciler_stats = reconciler.stats();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            config,
            store,
            toasts,
            dispatcher,
            backend,
            transport,
            event_tx,
            state_rx,
            reconciler_stats,
            pending: Mutex::new(Some((reconciler, event_rx))),
            session: Mutex::new(None),
        }
    }

    /// Build the HTTP backend, the WebSocket transport (when a push URL is set)
    /// and a logging navigator from `config`.
    pub fn from_config(config: NotiflowConfig) -> Result<Self> {
        config.validate()?;
        let backend: Arc<dyn NotificationBackend> = Arc::new(HttpBackend::new(&config.backend)?);
        let transport = match &config.channel.push_url {
            Some(url) => {
                let transport: Arc<dyn PushTransport> = Arc::new(WebSocketTransport::new(url)?);
                Some(transport)
            }
            None => None,
        };
        Ok(Self::new(config, backend, transport, Arc::new(LoggingNavigator)))
    }

    /// Start the reconciler and connect the delivery channel.
    pub fn start(&self, session: SessionIdentity) -> Result<()> {
        let Some((reconciler, event_rx)) = self.pending.lock().take() else {
            return Err(Error::Other(
                "notification center already started".to_string(),
            ));
        };

        info!(
            user_id = %session.user_id,
            push = self.config.channel.push_enabled,
            "Starting notification center"
        );
        let cancellation_token = CancellationToken::new();
        let reconciler_task = tokio::spawn(reconciler.run(event_rx, cancellation_token.clone()));

        let cursor_rx = self.store.read().subscribe_cursor();
        let channel = ChannelAdapter::new(
            self.config.channel.clone(),
            self.transport.clone(),
            self.backend.clone(),
            self.event_tx.clone(),
            cursor_rx,
        );
        channel.connect(session);

        *self.session.lock() = Some(Session {
            channel,
            reconciler_task,
            cancellation_token,
        });
        Ok(())
    }

    /// Disconnect the channel, stop the reconciler and drop all toasts.
    pub async fn shutdown(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        info!("Stopping notification center");
        session.channel.disconnect().await;
        session.cancellation_token.cancel();
        if let Err(e) = session.reconciler_task.await
            && e.is_panic()
        {
            warn!(error = %e, "Reconciler task panicked");
        }
        self.toasts.clear();
        info!("Notification center stopped");
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Feed an event from an outside source through the reconciler.
    pub fn inject(&self, event: WireEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| Error::Other("reconciler is not running".to_string()))
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.store.read().list()
    }

    pub fn page(&self, offset: usize, limit: usize) -> Vec<Notification> {
        self.store.read().page(offset, limit)
    }

    pub fn notification(&self, id: &str) -> Option<Notification> {
        self.store.read().get(id).cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.store.read().unread_count()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.store.read().subscribe_unread()
    }

    pub fn subscribe_toasts(&self) -> watch::Receiver<ToastSnapshot> {
        self.toasts.subscribe()
    }

    pub fn subscribe_channel_state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    pub fn toasts(&self) -> ToastSnapshot {
        self.toasts.snapshot()
    }

    /// Show a toast that did not come through the delivery channel.
    pub fn show_toast(&self, notification: Notification, options: ToastOptions) -> String {
        self.toasts.enqueue(notification, options)
    }

    pub fn dismiss_toast(&self, display_id: &str) -> bool {
        self.toasts.dismiss(display_id)
    }

    pub async fn act_on_toast(&self, display_id: &str, action_token: &str) -> ActionOutcome {
        self.toasts.act(display_id, action_token).await
    }

    pub fn pause_toast(&self, display_id: &str) -> bool {
        self.toasts.pause(display_id)
    }

    pub fn resume_toast(&self, display_id: &str) -> bool {
        self.toasts.resume(display_id)
    }

    pub async fn mark_read(&self, id: &str) {
        self.dispatcher.mark_read(id).await;
    }

    pub async fn mark_all_read(&self) {
        self.dispatcher.mark_all_read().await;
    }

    pub fn react(&self, id: &str, payload: Value) {
        self.dispatcher.react(id, payload);
    }

    pub fn navigate(&self, target: &str) -> bool {
        self.dispatcher.navigate(target)
    }

    pub fn stats(&self) -> NotificationStats {
        let (stored, unread) = {
            let store = self.store.read();
            (store.len(), store.unread_count())
        };
        let toasts = self.toasts.snapshot();
        let counters = self.reconciler_stats.snapshot();

        NotificationStats {
            stored,
            unread,
            visible_toasts: toasts.visible.len(),
            overflow_toasts: toasts.overflow,
            malformed_dropped: counters.malformed_dropped,
            duplicates_ignored: counters.duplicates_ignored,
            resyncs: counters.resyncs,
            channel_state: self.channel_state(),
        }
    }
}
