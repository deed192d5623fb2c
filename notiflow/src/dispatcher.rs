//! Action dispatcher.
//!
//! Turns user interactions into optimistic local updates plus backend calls.
//! Backend failures are logged and swallowed: local state is never rolled back
//! and nothing propagates to the caller.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::NotificationBackend;
use crate::model::Notification;
use crate::store::SharedStore;
use crate::{Error, Result};

/// Host hook for navigation.
pub trait Navigator: Send + Sync {
    /// Route within the application, e.g. `/teams/42`.
    fn open_internal(&self, route: &str);

    /// Open an external URL in a new context.
    fn open_external(&self, url: &Url);
}

/// Navigator that only logs; used when the host has no UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn open_internal(&self, route: &str) {
        info!(route, "Navigate (internal)");
    }

    fn open_external(&self, url: &Url) {
        info!(%url, "Navigate (external)");
    }
}

/// Where a navigation request points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Internal(String),
    External(Url),
}

impl NavigationTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.starts_with('/') && !target.starts_with("//") {
            return Ok(Self::Internal(target.to_string()));
        }

        let url = Url::parse(target)?;
        match url.scheme() {
            "http" | "https" | "mailto" => Ok(Self::External(url)),
            scheme => Err(Error::Other(format!(
                "unsupported navigation scheme: {scheme}"
            ))),
        }
    }
}

/// A decoded action token.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCommand {
    MarkRead,
    Dismiss,
    React(Value),
    Navigate(String),
}

impl ActionCommand {
    /// Decode `mark-read`, `dismiss`, `react:<payload>` or `navigate:<target>`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (verb, arg) = match token.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg.trim())),
            None => (token, None),
        };

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("mark-read" | "mark_read" | "read", None) => Some(Self::MarkRead),
            ("dismiss" | "close", None) => Some(Self::Dismiss),
            ("react" | "like", arg) => Some(Self::React(reaction_payload(arg.unwrap_or("like")))),
            ("navigate" | "open", Some(target)) if !target.is_empty() => {
                Some(Self::Navigate(target.to_string()))
            }
            _ => None,
        }
    }
}

fn reaction_payload(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({ "reaction": raw }))
}

/// What the caller should do with the toast after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran; the usual keep-open/persistent rules apply.
    Completed,
    /// The user asked for the toast to go away.
    Dismiss,
    /// The token was not understood.
    Ignored,
}

#[derive(Clone)]
pub struct ActionDispatcher {
    store: SharedStore,
    backend: Arc<dyn NotificationBackend>,
    navigator: Arc<dyn Navigator>,
}

impl ActionDispatcher {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn NotificationBackend>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            store,
            backend,
            navigator,
        }
    }

    /// Mark one notification read locally, then tell the backend.
    pub async fn mark_read(&self, id: &str) {
        let changed = self.store.write().mark_read(id);
        debug!(id, changed, "Marked notification read");

        if let Err(e) = self.backend.mark_read(id).await {
            warn!(id, error = %e, "Backend mark-read failed; keeping local state");
        }
    }

    /// Mark everything read locally, then tell the backend.
    pub async fn mark_all_read(&self) {
        let changed = self.store.write().mark_all_read();
        debug!(changed, "Marked all notifications read");

        if let Err(e) = self.backend.mark_all_read().await {
            warn!(error = %e, "Backend mark-all-read failed; keeping local state");
        }
    }

    /// Fire-and-forget reaction.
    pub fn react(&self, id: &str, payload: Value) {
        let backend = self.backend.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = backend.react(&id, &payload).await {
                warn!(id = %id, error = %e, "Backend reaction failed");
            }
        });
    }

    /// Hand a target to the navigator. Returns `false` for unusable targets.
    pub fn navigate(&self, target: &str) -> bool {
        match NavigationTarget::parse(target) {
            Ok(NavigationTarget::Internal(route)) => {
                self.navigator.open_internal(&route);
                true
            }
            Ok(NavigationTarget::External(url)) => {
                self.navigator.open_external(&url);
                true
            }
            Err(e) => {
                warn!(target, error = %e, "Ignoring navigation request");
                false
            }
        }
    }

    /// Run the action behind `action_token` for `notification`.
    pub async fn perform(&self, notification: &Notification, action_token: &str) -> ActionOutcome {
        let Some(command) = ActionCommand::parse(action_token) else {
            warn!(
                id = %notification.id,
                action_token,
                "Ignoring unknown action token"
            );
            return ActionOutcome::Ignored;
        };

        match command {
            ActionCommand::MarkRead => {
                self.mark_read(&notification.id).await;
                ActionOutcome::Completed
            }
            ActionCommand::Dismiss => ActionOutcome::Dismiss,
            ActionCommand::React(payload) => {
                self.react(&notification.id, payload);
                ActionOutcome::Completed
            }
            ActionCommand::Navigate(target) => {
                self.navigate(&target);
                ActionOutcome::Completed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationKind;
    use crate::store::NotificationStore;
    use crate::testing::{MockBackend, RecordingNavigator};
    use chrono::Utc;
    use rstest::rstest;

    fn dispatcher(
        backend: Arc<MockBackend>,
        navigator: Arc<RecordingNavigator>,
    ) -> (ActionDispatcher, SharedStore) {
        let store = NotificationStore::shared();
        (
            ActionDispatcher::new(store.clone(), backend, navigator),
            store,
        )
    }

    fn seed(store: &SharedStore, total: usize, unread: usize) {
        let mut store = store.write();
        for i in 0..total {
            let mut n = Notification::new(
                format!("n-{i}"),
                NotificationKind::Module,
                "t",
                "m",
                Utc::now(),
            );
            n.is_read = i >= unread;
            store.insert(n);
        }
    }

    #[rstest]
    #[case("mark-read", Some(ActionCommand::MarkRead))]
    #[case("dismiss", Some(ActionCommand::Dismiss))]
    #[case("react:🎉", Some(ActionCommand::React(json!({"reaction": "🎉"}))))]
    #[case(r#"react:{"emoji":"+1"}"#, Some(ActionCommand::React(json!({"emoji": "+1"}))))]
    #[case("like", Some(ActionCommand::React(json!({"reaction": "like"}))))]
    #[case("navigate:/teams/4", Some(ActionCommand::Navigate("/teams/4".to_string())))]
    #[case("navigate:", None)]
    #[case("archive", None)]
    fn parses_action_tokens(#[case] token: &str, #[case] expected: Option<ActionCommand>) {
        assert_eq!(ActionCommand::parse(token), expected);
    }

    #[test]
    fn classifies_navigation_targets() {
        assert_eq!(
            NavigationTarget::parse("/modules/3").unwrap(),
            NavigationTarget::Internal("/modules/3".to_string())
        );
        assert!(matches!(
            NavigationTarget::parse("https://example.com/docs").unwrap(),
            NavigationTarget::External(_)
        ));
        assert!(NavigationTarget::parse("javascript:alert(1)").is_err());
        assert!(NavigationTarget::parse("//evil.example").is_err());
    }

    #[tokio::test]
    async fn mark_all_read_survives_backend_failure() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_actions(true);
        let (dispatcher, store) = dispatcher(backend.clone(), Arc::new(RecordingNavigator::default()));
        seed(&store, 5, 3);
        assert_eq!(store.read().unread_count(), 3);

        dispatcher.mark_all_read().await;

        let store = store.read();
        assert_eq!(store.unread_count(), 0);
        assert!(store.iter().all(|n| n.is_read));
        assert_eq!(backend.mark_all_read_calls(), 1);
    }

    #[tokio::test]
    async fn mark_read_is_optimistic() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_actions(true);
        let (dispatcher, store) = dispatcher(backend.clone(), Arc::new(RecordingNavigator::default()));
        seed(&store, 2, 2);

        dispatcher.mark_read("n-1").await;
        dispatcher.mark_read("n-1").await;
        dispatcher.mark_read("missing").await;

        assert_eq!(store.read().unread_count(), 1);
        assert!(store.read().get("n-1").unwrap().is_read);
        assert_eq!(
            backend.mark_read_calls(),
            vec!["n-1".to_string(), "n-1".to_string(), "missing".to_string()]
        );
    }

    #[tokio::test]
    async fn react_does_not_touch_read_state() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, store) = dispatcher(backend.clone(), Arc::new(RecordingNavigator::default()));
        seed(&store, 1, 1);
        let notification = store.read().get("n-0").cloned().unwrap();

        let outcome = dispatcher.perform(&notification, "react:🔥").await;
        assert_eq!(outcome, ActionOutcome::Completed);

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(backend.react_calls().len(), 1);
        assert_eq!(backend.react_calls()[0].0, "n-0");
        assert_eq!(store.read().unread_count(), 1);
    }

    #[tokio::test]
    async fn navigate_routes_by_target_kind() {
        let navigator = Arc::new(RecordingNavigator::default());
        let (dispatcher, _) = dispatcher(Arc::new(MockBackend::new()), navigator.clone());

        assert!(dispatcher.navigate("/achievements"));
        assert!(dispatcher.navigate("https://example.com/post/1"));
        assert!(!dispatcher.navigate("ftp://example.com"));

        assert_eq!(navigator.internal(), vec!["/achievements".to_string()]);
        assert_eq!(
            navigator.external(),
            vec!["https://example.com/post/1".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_tokens_are_ignored() {
        let (dispatcher, store) = dispatcher(
            Arc::new(MockBackend::new()),
            Arc::new(RecordingNavigator::default()),
        );
        seed(&store, 1, 1);
        let notification = store.read().get("n-0").cloned().unwrap();

        assert_eq!(
            dispatcher.perform(&notification, "archive").await,
            ActionOutcome::Ignored
        );
        assert_eq!(
            dispatcher.perform(&notification, "dismiss").await,
            ActionOutcome::Dismiss
        );
        assert_eq!(store.read().unread_count(), 1);
    }
}
