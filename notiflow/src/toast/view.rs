//! Toast options and the render contract.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Notification;

/// Toast queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    /// Maximum number of toasts rendered at once. Persistent toasts may exceed it.
    pub max_visible: usize,
    /// Countdown for non-persistent toasts when the caller gives none.
    pub default_duration_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            max_visible: 5,
            default_duration_ms: 5000,
        }
    }
}

impl ToastConfig {
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }
}

/// Per-toast overrides.
#[derive(Debug, Clone, Default)]
pub struct ToastOptions {
    pub duration: Option<Duration>,
    /// Defaults to `true` for urgent notifications.
    pub persistent: Option<bool>,
    /// Defaults to a fresh v4 UUID.
    pub display_id: Option<String>,
    /// Free-form hints for the renderer (icon, accent, placement...).
    pub render_hints: BTreeMap<String, String>,
}

impl ToastOptions {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    pub fn with_display_id(mut self, display_id: impl Into<String>) -> Self {
        self.display_id = Some(display_id.into());
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.render_hints.insert(key.into(), value.into());
        self
    }
}

/// One rendered toast.
#[derive(Debug, Clone, PartialEq)]
pub struct ToastView {
    pub display_id: String,
    pub notification: Notification,
    pub persistent: bool,
    pub paused: bool,
    pub render_hints: BTreeMap<String, String>,
}

/// What the renderer should draw: visible toasts newest-first plus the
/// "+N more" tally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToastSnapshot {
    pub visible: Vec<ToastView>,
    pub overflow: usize,
}

impl ToastSnapshot {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.overflow == 0
    }

    pub fn display_ids(&self) -> Vec<&str> {
        self.visible.iter().map(|v| v.display_id.as_str()).collect()
    }
}

/// Split queue entries (newest-first) into visible toasts and overflow.
///
/// Persistent entries always render. Non-persistent entries take whatever
/// slots remain, newest first.
pub(super) fn layout<'a, I>(entries: I, max_visible: usize) -> (Vec<usize>, usize)
where
    I: Iterator<Item = &'a bool> + Clone,
{
    let persistent = entries.clone().filter(|p| **p).count();
    let mut free_slots = max_visible.saturating_sub(persistent);
    let mut visible = Vec::new();
    let mut overflow = 0;

    for (index, is_persistent) in entries.enumerate() {
        if *is_persistent {
            visible.push(index);
        } else if free_slots > 0 {
            free_slots -= 1;
            visible.push(index);
        } else {
            overflow += 1;
        }
    }

    (visible, overflow)
}
