//! Hand-written collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::backend::{NotificationBackend, NotificationPage};
use crate::channel::{PushStream, PushTransport, SessionIdentity};
use crate::dispatcher::Navigator;
use crate::model::{Notification, NotificationKind};
use crate::{Error, Result};

pub fn sample_notification(id: &str, created_at: DateTime<Utc>) -> Notification {
    Notification::new(
        id,
        NotificationKind::System,
        format!("Notification {id}"),
        "Something happened",
        created_at,
    )
}

/// In-memory backend. Server-side notifications are returned newest-first,
/// filtered strictly after `since`.
#[derive(Default)]
pub struct MockBackend {
    server: Mutex<Vec<Notification>>,
    unread_count: Mutex<Option<usize>>,
    fail_fetch: AtomicBool,
    stall_fetch: AtomicBool,
    fail_actions: AtomicBool,
    fetch_calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    mark_read_calls: Mutex<Vec<String>>,
    mark_all_read_calls: AtomicUsize,
    react_calls: Mutex<Vec<(String, Value)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_server(&self, notification: Notification) {
        self.server.lock().push(notification);
    }

    pub fn set_unread_count(&self, count: Option<usize>) {
        *self.unread_count.lock() = count;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make every fetch hang forever.
    pub fn stall_fetch(&self, stall: bool) {
        self.stall_fetch.store(stall, Ordering::SeqCst);
    }

    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.fetch_calls.lock().clone()
    }

    pub fn mark_read_calls(&self) -> Vec<String> {
        self.mark_read_calls.lock().clone()
    }

    pub fn mark_all_read_calls(&self) -> usize {
        self.mark_all_read_calls.load(Ordering::SeqCst)
    }

    pub fn react_calls(&self) -> Vec<(String, Value)> {
        self.react_calls.lock().clone()
    }

    fn action_result(&self) -> Result<()> {
        if self.fail_actions.load(Ordering::SeqCst) {
            Err(Error::backend(500, "internal error"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationBackend for MockBackend {
    async fn fetch_notifications(&self, since: Option<DateTime<Utc>>) -> Result<NotificationPage> {
        self.fetch_calls.lock().push(since);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::backend(503, "unavailable"));
        }
        if self.stall_fetch.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mut notifications: Vec<Notification> = self
            .server
            .lock()
            .iter()
            .filter(|n| since.is_none_or(|since| n.created_at > since))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(NotificationPage {
            notifications,
            unread_count: *self.unread_count.lock(),
        })
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.mark_read_calls.lock().push(id.to_string());
        self.action_result()
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.mark_all_read_calls.fetch_add(1, Ordering::SeqCst);
        self.action_result()
    }

    async fn react(&self, id: &str, payload: &Value) -> Result<()> {
        self.react_calls
            .lock()
            .push((id.to_string(), payload.clone()));
        self.action_result()
    }
}

/// Push transport driven by a script of connection outcomes.
///
/// Each `open` pops the next entry; an empty script refuses the connection.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Option<mpsc::UnboundedReceiver<Result<String>>>>>,
    open_calls: AtomicUsize,
    resume_tokens: Mutex<Vec<Option<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection. Frames sent on the returned sender are
    /// delivered; dropping it closes the connection.
    pub fn script_connection(&self) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded();
        self.script.lock().push_back(Some(rx));
        tx
    }

    pub fn script_failure(&self) {
        self.script.lock().push_back(None);
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn resume_tokens(&self) -> Vec<Option<String>> {
        self.resume_tokens.lock().clone()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn open(
        &self,
        _session: &SessionIdentity,
        resume_token: Option<String>,
    ) -> Result<PushStream> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.resume_tokens.lock().push(resume_token);

        match self.script.lock().pop_front().flatten() {
            Some(rx) => Ok(rx.boxed()),
            None => Err(Error::Other("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    internal: Mutex<Vec<String>>,
    external: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn internal(&self) -> Vec<String> {
        self.internal.lock().clone()
    }

    pub fn external(&self) -> Vec<String> {
        self.external.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn open_internal(&self, route: &str) {
        self.internal.lock().push(route.to_string());
    }

    fn open_external(&self, url: &Url) {
        self.external.lock().push(url.to_string());
    }
}
