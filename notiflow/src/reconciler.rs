//! Applies inbound events to the notification store.
//!
//! A single task owns the [`Reconciler`] and applies events strictly in
//! arrival order. New, unread, non-silent notifications are forwarded to the
//! toast queue. Whenever the channel (re)enters `connected` the reconciler
//! pulls everything it missed from the backend and applies it silently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::backend::NotificationBackend;
use crate::events::{ChannelState, InboundEvent, WireEvent};
use crate::store::{InsertOutcome, SharedStore, catch_up_since};
use crate::toast::{ToastOptions, ToastQueue};

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted { toasted: bool },
    Duplicate,
    Read { changed: bool },
    AllRead { changed: usize },
    StateChanged { state: ChannelState, resync: bool },
    UnreadReconciled { count: usize },
    Dropped,
}

/// Counters kept by the reconciler task.
#[derive(Debug, Default)]
pub struct ReconcilerStats {
    applied: AtomicU64,
    malformed_dropped: AtomicU64,
    duplicates_ignored: AtomicU64,
    resyncs: AtomicU64,
}

impl ReconcilerStats {
    pub fn snapshot(&self) -> ReconcilerStatsSnapshot {
        ReconcilerStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            duplicates_ignored: self.duplicates_ignored.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerStatsSnapshot {
    pub applied: u64,
    pub malformed_dropped: u64,
    pub duplicates_ignored: u64,
    pub resyncs: u64,
}

pub struct Reconciler {
    store: SharedStore,
    toasts: ToastQueue,
    backend: Arc<dyn NotificationBackend>,
    state_tx: watch::Sender<ChannelState>,
    /// Set until the first successful resync and again after every disconnect.
    needs_resync: bool,
    stats: Arc<ReconcilerStats>,
}

impl Reconciler {
    pub fn new(
        store: SharedStore,
        toasts: ToastQueue,
        backend: Arc<dyn NotificationBackend>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            store,
            toasts,
            backend,
            state_tx,
            needs_resync: true,
            stats: Arc::new(ReconcilerStats::default()),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<ReconcilerStats> {
        self.stats.clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Decode and apply one wire event. Malformed events are logged and dropped.
    pub async fn ingest(&mut self, wire: WireEvent) -> IngestOutcome {
        let event = match InboundEvent::try_from(wire) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Dropping malformed event");
                return IngestOutcome::Dropped;
            }
        };

        let outcome = self.apply(event);
        if let IngestOutcome::StateChanged { resync: true, .. } = outcome {
            self.resync().await;
        }
        outcome
    }

    /// Apply a decoded event to local state.
    ///
    /// Resync is signalled through the outcome; [`Reconciler::ingest`] runs it.
    pub fn apply(&mut self, event: InboundEvent) -> IngestOutcome {
        self.stats.applied.fetch_add(1, Ordering::Relaxed);

        match event {
            InboundEvent::NewNotification {
                notification,
                silent,
            } => {
                let toast = (!silent && !notification.is_read).then(|| notification.clone());
                let id = notification.id.clone();

                if self.store.write().insert(notification) == InsertOutcome::Duplicate {
                    self.stats.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
                    return IngestOutcome::Duplicate;
                }

                let toasted = match toast {
                    Some(notification) => {
                        self.toasts.enqueue(notification, ToastOptions::default());
                        true
                    }
                    None => false,
                };
                debug!(id = %id, silent, toasted, "Notification stored");
                IngestOutcome::Inserted { toasted }
            }
            InboundEvent::Read { notification_id } => {
                let changed = self.store.write().mark_read(&notification_id);
                debug!(id = %notification_id, changed, "Applied read event");
                IngestOutcome::Read { changed }
            }
            InboundEvent::AllRead => {
                let changed = self.store.write().mark_all_read();
                debug!(changed, "Applied all-read event");
                IngestOutcome::AllRead { changed }
            }
            InboundEvent::ChannelStateChanged { state } => {
                let previous = self.state_tx.send_replace(state);
                if previous != state {
                    info!(from = %previous, to = %state, "Delivery channel state changed");
                }

                let resync = match state {
                    ChannelState::Connected => self.needs_resync,
                    ChannelState::Disconnected => {
                        self.needs_resync = true;
                        false
                    }
                    ChannelState::Connecting => false,
                };
                IngestOutcome::StateChanged { state, resync }
            }
            InboundEvent::UnreadCount { count } => {
                self.store.write().reconcile_unread(count);
                IngestOutcome::UnreadReconciled { count }
            }
        }
    }

    /// Pull what was missed while disconnected and reconcile the unread count.
    async fn resync(&mut self) {
        match self.fetch_missed().await {
            Ok(inserted) => {
                self.needs_resync = false;
                self.stats.resyncs.fetch_add(1, Ordering::Relaxed);
                info!(inserted, "Resynchronized with backend");
            }
            Err(e) => warn!(error = %e, "Resync failed; will retry on next connect"),
        }
    }

    async fn fetch_missed(&mut self) -> Result<usize> {
        let since = catch_up_since(self.store.read().latest_created_at());
        let page = self.backend.fetch_notifications(since).await?;

        let mut inserted = 0;
        // Pages are newest-first; apply oldest-first so the newest ends up at the head.
        for notification in page.notifications.into_iter().rev() {
            let outcome = self.apply(InboundEvent::NewNotification {
                notification,
                silent: true,
            });
            if matches!(outcome, IngestOutcome::Inserted { .. }) {
                inserted += 1;
            }
        }

        if let Some(count) = page.unread_count {
            self.store.write().reconcile_unread(count);
        }
        Ok(inserted)
    }

    /// Apply events until cancelled or until every sender is gone.
    ///
    /// Events already queued when cancellation arrives are still applied, but a
    /// resync still waiting on the backend is abandoned.
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<WireEvent>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(event) => {
                        // A resync can wait on the backend; shutdown must not.
                        tokio::select! {
                            biased;
                            _ = self.ingest(event) => {}
                            _ = cancellation_token.cancelled() => {
                                debug!("Reconciler cancelled mid-event");
                                break;
                            }
                        }
                    }
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
                _ = cancellation_token.cancelled() => {
                    debug!("Reconciler shutting down");
                    break;
                }
            }
        }
    }
}
