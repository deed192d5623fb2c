//! Backend collaborator.
//!
//! The REST endpoints that store notifications live elsewhere; this module
//! only describes what the client consumes from them.

mod http;

pub use http::{BackendConfig, HttpBackend};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::model::Notification;

/// One page of notifications as returned by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    /// Notifications, newest-first.
    pub notifications: Vec<Notification>,
    /// The backend's authoritative unread count, when it reports one.
    #[serde(default)]
    pub unread_count: Option<usize>,
}

/// Operations the client needs from the notification backend.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Fetch notifications created strictly after `since` (everything when `None`).
    async fn fetch_notifications(&self, since: Option<DateTime<Utc>>) -> Result<NotificationPage>;

    /// Mark a single notification read.
    async fn mark_read(&self, id: &str) -> Result<()>;

    /// Mark every notification read.
    async fn mark_all_read(&self) -> Result<()>;

    /// Attach a reaction to a notification.
    async fn react(&self, id: &str, payload: &Value) -> Result<()>;
}
