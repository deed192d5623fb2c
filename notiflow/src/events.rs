//! Inbound delivery events.
//!
//! [`WireEvent`] is the untyped JSON shape both transports produce (the push
//! channel forwards it verbatim, the poller synthesizes it). The reconciler
//! converts it into the closed [`InboundEvent`] set before applying it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Notification, NotificationId};

/// Connection state of the delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewNotification,
    Read,
    AllRead,
    ChannelStateChanged,
    UnreadCount,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewNotification => "new-notification",
            Self::Read => "read",
            Self::AllRead => "all-read",
            Self::ChannelStateChanged => "channel-state-changed",
            Self::UnreadCount => "unread-count",
        }
    }
}

struct EventKindInfo {
    kind: EventKind,
    aliases: &'static [&'static str],
}

const EVENT_KINDS: &[EventKindInfo] = &[
    EventKindInfo {
        kind: EventKind::NewNotification,
        aliases: &[
            "new-notification",
            "new_notification",
            "NewNotification",
            "notification.new",
            "notification",
        ],
    },
    EventKindInfo {
        kind: EventKind::Read,
        aliases: &["read", "notification.read", "notification-read", "MarkRead"],
    },
    EventKindInfo {
        kind: EventKind::AllRead,
        aliases: &["all-read", "all_read", "AllRead", "notification.all_read", "read-all"],
    },
    EventKindInfo {
        kind: EventKind::ChannelStateChanged,
        aliases: &[
            "channel-state-changed",
            "channel_state_changed",
            "ChannelStateChanged",
            "channel.state",
        ],
    },
    EventKindInfo {
        kind: EventKind::UnreadCount,
        aliases: &["unread-count", "unread_count", "UnreadCount", "notification.unread_count"],
    },
];

/// Map a wire `kind` string onto an [`EventKind`].
///
/// Matching ignores case and `.`/`-`/`_`/space separators.
pub fn canonicalize_event_kind(input: &str) -> Option<EventKind> {
    let normalized = normalize_kind(input);
    if normalized.is_empty() {
        return None;
    }

    EVENT_KINDS
        .iter()
        .find(|info| {
            info.aliases
                .iter()
                .any(|alias| normalize_kind(alias) == normalized)
        })
        .map(|info| info.kind)
}

fn normalize_kind(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | '_' | ' '))
        .collect()
}

/// Untyped inbound event as it travels over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub silent: bool,
}

impl WireEvent {
    /// Decode a single text frame.
    pub fn parse(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn new_notification(notification: &Notification, silent: bool) -> Result<Self> {
        Ok(Self {
            kind: EventKind::NewNotification.as_str().to_string(),
            notification: Some(serde_json::to_value(notification)?),
            silent,
            ..Default::default()
        })
    }

    pub fn read(notification_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Read.as_str().to_string(),
            notification_id: Some(notification_id.into()),
            ..Default::default()
        }
    }

    pub fn all_read() -> Self {
        Self {
            kind: EventKind::AllRead.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn channel_state(state: ChannelState) -> Self {
        Self {
            kind: EventKind::ChannelStateChanged.as_str().to_string(),
            state: Some(state.as_str().to_string()),
            ..Default::default()
        }
    }

    /// The backend's authoritative unread count.
    pub fn unread_count(count: usize) -> Self {
        Self {
            kind: EventKind::UnreadCount.as_str().to_string(),
            unread_count: Some(count),
            ..Default::default()
        }
    }
}

/// Typed inbound event applied by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A notification was created. `silent` suppresses the toast.
    NewNotification {
        notification: Notification,
        silent: bool,
    },
    /// A single notification was read elsewhere.
    Read { notification_id: NotificationId },
    /// Every notification was read elsewhere.
    AllRead,
    /// The delivery channel changed state.
    ChannelStateChanged { state: ChannelState },
    /// The backend reported its unread count.
    UnreadCount { count: usize },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewNotification { .. } => EventKind::NewNotification,
            Self::Read { .. } => EventKind::Read,
            Self::AllRead => EventKind::AllRead,
            Self::ChannelStateChanged { .. } => EventKind::ChannelStateChanged,
            Self::UnreadCount { .. } => EventKind::UnreadCount,
        }
    }
}

impl TryFrom<WireEvent> for InboundEvent {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self> {
        let kind = canonicalize_event_kind(&wire.kind)
            .ok_or_else(|| Error::malformed(format!("unknown event kind '{}'", wire.kind)))?;

        match kind {
            EventKind::NewNotification => {
                let value = wire
                    .notification
                    .ok_or_else(|| Error::malformed("new-notification without a notification"))?;
                let notification: Notification = serde_json::from_value(value)
                    .map_err(|e| Error::malformed(format!("undecodable notification: {e}")))?;
                if notification.id.trim().is_empty() {
                    return Err(Error::malformed("notification with an empty id"));
                }
                Ok(Self::NewNotification {
                    notification,
                    silent: wire.silent,
                })
            }
            EventKind::Read => {
                let notification_id = wire
                    .notification_id
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| Error::malformed("read event without a notificationId"))?;
                Ok(Self::Read { notification_id })
            }
            EventKind::AllRead => Ok(Self::AllRead),
            EventKind::ChannelStateChanged => {
                let raw = wire
                    .state
                    .ok_or_else(|| Error::malformed("channel-state-changed without a state"))?;
                let state = ChannelState::parse(&raw)
                    .ok_or_else(|| Error::malformed(format!("unknown channel state '{raw}'")))?;
                Ok(Self::ChannelStateChanged { state })
            }
            EventKind::UnreadCount => {
                let count = wire
                    .unread_count
                    .ok_or_else(|| Error::malformed("unread-count event without unreadCount"))?;
                Ok(Self::UnreadCount { count })
            }
        }
    }
}
