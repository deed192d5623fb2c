//! Toast queue manager.
//!
//! Owns the ordered set of transient toasts, their countdowns and the
//! capacity rule. The renderer reads [`ToastSnapshot`]s from a watch channel
//! and changes state only through `dismiss`, `act`, `pause` and `resume`.

mod view;

pub use view::{ToastConfig, ToastOptions, ToastSnapshot, ToastView};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatcher::{ActionDispatcher, ActionOutcome};
use crate::model::Notification;

struct ToastEntry {
    display_id: String,
    notification: Notification,
    persistent: bool,
    duration: Duration,
    render_hints: BTreeMap<String, String>,
}

/// Countdown for one non-persistent toast.
struct Countdown {
    generation: u64,
    remaining: Duration,
    /// Set while the countdown is running.
    running: Option<(Instant, CancellationToken)>,
}

impl Countdown {
    fn cancel(&mut self) {
        if let Some((_, token)) = self.running.take() {
            token.cancel();
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Newest at the front.
    entries: VecDeque<ToastEntry>,
    timers: HashMap<String, Countdown>,
    next_generation: u64,
}

impl QueueState {
    fn position(&self, display_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.display_id == display_id)
    }

    fn remove(&mut self, display_id: &str) -> bool {
        if let Some(mut countdown) = self.timers.remove(display_id) {
            countdown.cancel();
        }
        match self.position(display_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self, max_visible: usize) -> ToastSnapshot {
        let (visible, overflow) = view::layout(
            self.entries.iter().map(|e| &e.persistent),
            max_visible,
        );
        let visible = visible
            .into_iter()
            .filter_map(|index| self.entries.get(index))
            .map(|entry| ToastView {
                display_id: entry.display_id.clone(),
                notification: entry.notification.clone(),
                persistent: entry.persistent,
                paused: self
                    .timers
                    .get(&entry.display_id)
                    .is_some_and(|c| c.running.is_none()),
                render_hints: entry.render_hints.clone(),
            })
            .collect();
        ToastSnapshot { visible, overflow }
    }
}

struct Inner {
    config: ToastConfig,
    state: Mutex<QueueState>,
    snapshot_tx: watch::Sender<ToastSnapshot>,
    dispatcher: ActionDispatcher,
}

impl Inner {
    fn publish(&self, state: &QueueState) {
        self.snapshot_tx
            .send_replace(state.snapshot(self.config.max_visible));
    }

    fn expire(&self, display_id: &str, generation: u64) {
        let mut state = self.state.lock();
        let current = state
            .timers
            .get(display_id)
            .is_some_and(|c| c.generation == generation && c.running.is_some());
        if !current {
            trace!(display_id, generation, "Ignoring stale toast timer");
            return;
        }

        state.remove(display_id);
        debug!(display_id, "Toast expired");
        self.publish(&state);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for countdown in self.state.get_mut().timers.values_mut() {
            countdown.cancel();
        }
    }
}

/// Cloneable handle to the toast queue.
#[derive(Clone)]
pub struct ToastQueue {
    inner: Arc<Inner>,
}

impl ToastQueue {
    pub fn new(config: ToastConfig, dispatcher: ActionDispatcher) -> Self {
        let (snapshot_tx, _) = watch::channel(ToastSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(QueueState::default()),
                snapshot_tx,
                dispatcher,
            }),
        }
    }

    pub fn config(&self) -> &ToastConfig {
        &self.inner.config
    }

    /// Show a toast for `notification`. Returns its display id.
    ///
    /// Re-using an active display id replaces that toast and restarts its
    /// countdown. Must be called from within a tokio runtime.
    pub fn enqueue(&self, notification: Notification, options: ToastOptions) -> String {
        let display_id = options
            .display_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let persistent = options
            .persistent
            .unwrap_or_else(|| notification.is_urgent());
        let duration = options
            .duration
            .unwrap_or_else(|| self.inner.config.default_duration());

        let mut state = self.inner.state.lock();
        if state.remove(&display_id) {
            debug!(display_id = %display_id, "Replacing active toast");
        }

        if !persistent {
            state.next_generation += 1;
            let generation = state.next_generation;
            let token = spawn_countdown(&self.inner, display_id.clone(), generation, duration);
            state.timers.insert(
                display_id.clone(),
                Countdown {
                    generation,
                    remaining: duration,
                    running: Some((Instant::now(), token)),
                },
            );
        }

        debug!(
            display_id = %display_id,
            notification_id = %notification.id,
            persistent,
            duration_ms = duration.as_millis() as u64,
            "Toast enqueued"
        );
        state.entries.push_front(ToastEntry {
            display_id: display_id.clone(),
            notification,
            persistent,
            duration,
            render_hints: options.render_hints,
        });
        self.inner.publish(&state);
        display_id
    }

    /// Remove a toast now. Unknown or already dismissed ids are a no-op.
    pub fn dismiss(&self, display_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.remove(display_id);
        if removed {
            debug!(display_id, "Toast dismissed");
            self.inner.publish(&state);
        }
        removed
    }

    /// Freeze a toast's countdown (e.g. while hovered).
    pub fn pause(&self, display_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(countdown) = state.timers.get_mut(display_id) else {
            return false;
        };
        let Some((started, token)) = countdown.running.take() else {
            return false;
        };

        token.cancel();
        countdown.remaining = countdown.remaining.saturating_sub(started.elapsed());
        trace!(
            display_id,
            remaining_ms = countdown.remaining.as_millis() as u64,
            "Toast paused"
        );
        self.inner.publish(&state);
        true
    }

    /// Restart a paused countdown from where it stopped.
    pub fn resume(&self, display_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(duration) = state
            .position(display_id)
            .and_then(|index| state.entries.get(index))
            .map(|entry| entry.duration)
        else {
            return false;
        };

        state.next_generation += 1;
        let generation = state.next_generation;
        let Some(countdown) = state.timers.get_mut(display_id) else {
            return false;
        };
        if countdown.running.is_some() {
            return false;
        }

        let remaining = countdown.remaining.min(duration);
        let token = spawn_countdown(&self.inner, display_id.to_string(), generation, remaining);
        countdown.generation = generation;
        countdown.remaining = remaining;
        countdown.running = Some((Instant::now(), token));
        trace!(
            display_id,
            remaining_ms = remaining.as_millis() as u64,
            "Toast resumed"
        );
        self.inner.publish(&state);
        true
    }

    /// Run a toast action through the dispatcher.
    ///
    /// Afterwards the toast is dismissed unless the action keeps it open or
    /// the toast is persistent. An explicit `dismiss` action always closes it;
    /// unknown tokens leave it alone.
    pub async fn act(&self, display_id: &str, action_token: &str) -> ActionOutcome {
        let target = {
            let state = self.inner.state.lock();
            state
                .position(display_id)
                .and_then(|index| state.entries.get(index))
                .map(|entry| (entry.notification.clone(), entry.persistent))
        };
        let Some((notification, persistent)) = target else {
            debug!(display_id, action_token, "Action on inactive toast ignored");
            return ActionOutcome::Ignored;
        };

        let keep_open = notification
            .action(action_token)
            .is_some_and(|action| action.keep_open);
        let outcome = self.inner.dispatcher.perform(&notification, action_token).await;

        let close = match outcome {
            ActionOutcome::Dismiss => true,
            ActionOutcome::Completed => !keep_open && !persistent,
            ActionOutcome::Ignored => false,
        };
        if close {
            self.dismiss(display_id);
        }
        outcome
    }

    /// Drop every toast and cancel every countdown.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for countdown in state.timers.values_mut() {
            countdown.cancel();
        }
        state.timers.clear();
        state.entries.clear();
        self.inner.publish(&state);
    }

    pub fn snapshot(&self) -> ToastSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ToastSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Number of active toasts, visible or not.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_active(&self, display_id: &str) -> bool {
        self.inner.state.lock().position(display_id).is_some()
    }
}

fn spawn_countdown(
    inner: &Arc<Inner>,
    display_id: String,
    generation: u64,
    delay: Duration,
) -> CancellationToken {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let inner: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if let Some(inner) = inner.upgrade() {
                    inner.expire(&display_id, generation);
                }
            }
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationAction, NotificationKind, Priority};
    use crate::store::{NotificationStore, SharedStore};
    use crate::testing::{MockBackend, RecordingNavigator, sample_notification};
    use chrono::Utc;

    fn queue(max_visible: usize) -> (ToastQueue, SharedStore) {
        let store = NotificationStore::shared();
        let dispatcher = ActionDispatcher::new(
            store.clone(),
            Arc::new(MockBackend::new()),
            Arc::new(RecordingNavigator::default()),
        );
        let queue = ToastQueue::new(
            ToastConfig {
                max_visible,
                default_duration_ms: 5000,
            },
            dispatcher,
        );
        (queue, store)
    }

    fn toast(id: &str) -> Notification {
        sample_notification(id, Utc::now())
    }

    fn enqueue_named(queue: &ToastQueue, id: &str) -> String {
        queue.enqueue(toast(id), ToastOptions::default().with_display_id(id))
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_then_dismiss_promotes_one() {
        let (queue, _) = queue(5);
        for i in 1..=7 {
            enqueue_named(&queue, &format!("t{i}"));
        }

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.display_ids(), vec!["t7", "t6", "t5", "t4", "t3"]);
        assert_eq!(snapshot.overflow, 2);

        assert!(queue.dismiss("t5"));
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.display_ids(), vec!["t7", "t6", "t4", "t3", "t2"]);
        assert_eq!(snapshot.overflow, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_toasts_ignore_capacity() {
        let (queue, _) = queue(2);
        for i in 0..3 {
            queue.enqueue(
                toast(&format!("u{i}")).with_priority(Priority::Urgent),
                ToastOptions::default(),
            );
        }
        queue.enqueue(toast("normal"), ToastOptions::default());

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.visible.len(), 3);
        assert!(snapshot.visible.iter().all(|v| v.persistent));
        assert_eq!(snapshot.overflow, 1);

        // Urgent toasts never expire on their own.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn toast_expires_after_duration() {
        let (queue, _) = queue(5);
        let mut rx = queue.subscribe();
        queue.enqueue(
            toast("a"),
            ToastOptions::default()
                .with_display_id("a")
                .with_duration(Duration::from_millis(3000)),
        );
        rx.borrow_and_update();

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(queue.is_active("a"));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!queue.is_active("a"));
        assert!(rx.has_changed().unwrap());
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_toasts_count_down_too() {
        let (queue, _) = queue(1);
        enqueue_named(&queue, "old");
        enqueue_named(&queue, "new");
        assert_eq!(queue.snapshot().overflow, 1);

        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_use_remaining_time() {
        let (queue, _) = queue(5);
        enqueue_named(&queue, "a");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(queue.pause("a"));
        assert!(!queue.pause("a"));
        assert!(queue.snapshot().visible[0].paused);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(queue.is_active("a"));

        assert!(queue.resume("a"));
        assert!(!queue.resume("a"));
        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(queue.is_active("a"));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!queue.is_active("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_toast_cancels_the_old_timer() {
        let (queue, _) = queue(5);
        enqueue_named(&queue, "same");
        tokio::time::sleep(Duration::from_secs(3)).await;
        enqueue_named(&queue, "same");
        assert_eq!(queue.len(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(queue.is_active("same"));

        tokio::time::sleep(Duration::from_millis(2501)).await;
        assert!(!queue.is_active("same"));
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_idempotent() {
        let (queue, _) = queue(5);
        enqueue_named(&queue, "a");
        assert!(queue.dismiss("a"));
        assert!(!queue.dismiss("a"));
        assert!(!queue.dismiss("never-existed"));
        assert!(!queue.resume("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn act_dismisses_unless_kept_open() {
        let (queue, store) = queue(5);
        let notification = Notification::new(
            "n1",
            NotificationKind::Achievement,
            "Badge earned",
            "You earned a badge",
            Utc::now(),
        )
        .with_action(NotificationAction::new("Like", "react:👍").keep_open())
        .with_action(NotificationAction::new("Mark read", "mark-read"));
        store.write().insert(notification.clone());

        queue.enqueue(notification, ToastOptions::default().with_display_id("t"));

        assert_eq!(queue.act("t", "react:👍").await, ActionOutcome::Completed);
        assert!(queue.is_active("t"));

        assert_eq!(queue.act("t", "bogus").await, ActionOutcome::Ignored);
        assert!(queue.is_active("t"));

        assert_eq!(queue.act("t", "mark-read").await, ActionOutcome::Completed);
        assert!(!queue.is_active("t"));
        assert_eq!(store.read().unread_count(), 0);

        assert_eq!(queue.act("t", "mark-read").await, ActionOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_toast_survives_actions_but_not_dismiss() {
        let (queue, _) = queue(5);
        let urgent = toast("urgent").with_priority(Priority::Urgent);
        queue.enqueue(urgent, ToastOptions::default().with_display_id("u"));

        queue.act("u", "mark-read").await;
        assert!(queue.is_active("u"));

        assert_eq!(queue.act("u", "dismiss").await, ActionOutcome::Dismiss);
        assert!(!queue.is_active("u"));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_everything() {
        let (queue, _) = queue(5);
        enqueue_named(&queue, "a");
        enqueue_named(&queue, "b");
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.snapshot().is_empty());
    }
}
