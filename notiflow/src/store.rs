//! In-memory notification store for the current session.
//!
//! Holds the canonical newest-first list and the unread counter. Read state is
//! monotonic: nothing in here ever sets `is_read` back to `false`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{Notification, NotificationId};

/// How far behind the cursor catch-up fetches reach.
///
/// Notifications sharing the cursor's timestamp, or created slightly before a
/// notification that arrived earlier, are only recovered by overlapping the
/// cursor. Repeats are absorbed by id dedup.
pub const SYNC_OVERLAP_SECS: i64 = 300;

/// The `since` bound for a catch-up fetch from `cursor`.
pub fn catch_up_since(cursor: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    cursor.map(|cursor| cursor - chrono::Duration::seconds(SYNC_OVERLAP_SECS))
}

/// Store handle shared by the reconciler and the action dispatcher.
pub type SharedStore = Arc<RwLock<NotificationStore>>;

/// Result of inserting a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

pub struct NotificationStore {
    notifications: VecDeque<Notification>,
    ids: HashSet<NotificationId>,
    unread_count: usize,
    unread_tx: watch::Sender<usize>,
    cursor_tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (unread_tx, _) = watch::channel(0);
        let (cursor_tx, _) = watch::channel(None);
        Self {
            notifications: VecDeque::new(),
            ids: HashSet::new(),
            unread_count: 0,
            unread_tx,
            cursor_tx,
        }
    }

    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert at the head. Re-delivery of a known id is a no-op.
    pub fn insert(&mut self, notification: Notification) -> InsertOutcome {
        if !self.ids.insert(notification.id.clone()) {
            debug!(id = %notification.id, "Ignoring duplicate notification");
            return InsertOutcome::Duplicate;
        }

        if !notification.is_read {
            self.unread_count += 1;
        }

        let created_at = notification.created_at;
        self.notifications.push_front(notification);
        self.cursor_tx.send_if_modified(|cursor| match cursor {
            Some(current) if *current >= created_at => false,
            _ => {
                *cursor = Some(created_at);
                true
            }
        });
        self.publish_unread();
        InsertOutcome::Inserted
    }

    /// Mark one notification read.
    ///
    /// Returns `true` when the notification transitioned from unread to read.
    /// Unknown ids are a no-op.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(notification) = self.notifications.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if notification.is_read {
            return false;
        }

        notification.is_read = true;
        self.unread_count = self.unread_count.saturating_sub(1);
        self.publish_unread();
        true
    }

    /// Mark every notification read. Returns how many transitioned.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for notification in self.notifications.iter_mut().filter(|n| !n.is_read) {
            notification.is_read = true;
            changed += 1;
        }
        self.unread_count = 0;
        self.publish_unread();
        changed
    }

    /// Replace the optimistic counter with the backend's authoritative count.
    pub fn reconcile_unread(&mut self, backend_count: usize) {
        if backend_count != self.unread_count {
            debug!(
                local = self.unread_count,
                backend = backend_count,
                "Reconciling unread count with backend"
            );
        }
        self.unread_count = backend_count;
        self.publish_unread();
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Iterate newest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    /// Snapshot of the whole list, newest-first.
    pub fn list(&self) -> Vec<Notification> {
        self.notifications.iter().cloned().collect()
    }

    /// One page of the list, newest-first.
    pub fn page(&self, offset: usize, limit: usize) -> Vec<Notification> {
        self.notifications
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn unread(&self) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| !n.is_read)
            .cloned()
            .collect()
    }

    /// Newest `created_at` ever admitted; the sync cursor for polling and resync.
    pub fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        *self.cursor_tx.borrow()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.unread_tx.subscribe()
    }

    pub fn subscribe_cursor(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.cursor_tx.subscribe()
    }

    fn publish_unread(&self) {
        self.unread_tx.send_replace(self.unread_count);
    }
}
