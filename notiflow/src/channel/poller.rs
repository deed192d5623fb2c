//! Polling fallback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::Result;
use crate::backend::NotificationBackend;
use crate::events::WireEvent;
use crate::store::catch_up_since;

/// Fetches notifications newer than the store's cursor and turns them into
/// the same wire events the push channel delivers.
pub(super) struct Poller {
    backend: Arc<dyn NotificationBackend>,
    cursor_rx: watch::Receiver<Option<DateTime<Utc>>>,
    backfilled: bool,
}

impl Poller {
    pub(super) fn new(
        backend: Arc<dyn NotificationBackend>,
        cursor_rx: watch::Receiver<Option<DateTime<Utc>>>,
    ) -> Self {
        Self {
            backend,
            cursor_rx,
            backfilled: false,
        }
    }

    pub(super) fn cursor(&self) -> Option<DateTime<Utc>> {
        *self.cursor_rx.borrow()
    }

    /// Run one poll. Returns the synthesized events, oldest-first, followed by
    /// an unread-count event when the backend reports one.
    ///
    /// The fetch overlaps the cursor, so already-delivered notifications come
    /// back and are dropped by the store's id dedup. The first successful poll
    /// of a session without a cursor is a backfill and every event it yields
    /// is silent.
    pub(super) async fn poll(&mut self) -> Result<Vec<WireEvent>> {
        let cursor = self.cursor();
        let since = catch_up_since(cursor);
        let page = self.backend.fetch_notifications(since).await?;
        let silent = cursor.is_none() && !self.backfilled;
        self.backfilled = true;

        let mut events = Vec::with_capacity(page.notifications.len() + 1);
        for notification in page.notifications.iter().rev() {
            events.push(WireEvent::new_notification(notification, silent)?);
        }
        if let Some(count) = page.unread_count {
            events.push(WireEvent::unread_count(count));
        }

        debug!(
            since = ?since,
            fetched = page.notifications.len(),
            unread = ?page.unread_count,
            silent,
            "Poll completed"
        );
        Ok(events)
    }

    /// Poll and forward. Returns `false` once the receiving side is gone.
    pub(super) async fn poll_into(&mut self, tx: &mpsc::UnboundedSender<WireEvent>) -> bool {
        match self.poll().await {
            Ok(events) => events.into_iter().all(|event| tx.send(event).is_ok()),
            Err(e) => {
                warn!(error = %e, "Notification poll failed");
                !tx.is_closed()
            }
        }
    }
}
