//! Durable notification model.
//!
//! These types mirror the records the backend hands out. Field names use the
//! backend's camelCase wire spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, backend-assigned notification identifier.
pub type NotificationId = String;

/// What the notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Achievement,
    Module,
    Team,
    System,
    Reminder,
    Social,
    Security,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Achievement => "achievement",
            Self::Module => "module",
            Self::Team => "team",
            Self::System => "system",
            Self::Reminder => "reminder",
            Self::Social => "social",
            Self::Security => "security",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual importance of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational only.
    Low,
    /// Standard notifications.
    #[default]
    Medium,
    /// Important events.
    High,
    /// Requires immediate attention; toasts for these stay until dismissed.
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Button style hint for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    Primary,
    #[default]
    Secondary,
    Destructive,
}

/// An action the user can take on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub label: String,
    /// Opaque token routed to the action dispatcher (`mark-read`, `react:<payload>`, ...).
    pub action_token: String,
    #[serde(default)]
    pub style: ActionStyle,
    /// Keep the toast open after the action completes.
    #[serde(default)]
    pub keep_open: bool,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, action_token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action_token: action_token.into(),
            style: ActionStyle::default(),
            keep_open: false,
        }
    }

    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }
}

/// Who triggered the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// A durable notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    #[serde(default)]
    pub importance: Importance,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub sender: Option<Sender>,
}

impl Notification {
    /// Create an unread notification with default importance and priority.
    pub fn new(
        id: impl Into<NotificationId>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            importance: Importance::default(),
            title: title.into(),
            message: message.into(),
            created_at,
            is_read: false,
            priority: Priority::default(),
            actions: Vec::new(),
            sender: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_sender(mut self, name: impl Into<String>, avatar_ref: Option<String>) -> Self {
        self.sender = Some(Sender {
            name: name.into(),
            avatar_ref,
        });
        self
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }

    /// Look up one of this notification's actions by token.
    pub fn action(&self, action_token: &str) -> Option<&NotificationAction> {
        self.actions.iter().find(|a| a.action_token == action_token)
    }
}
