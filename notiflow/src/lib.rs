//! notiflow library crate.
//!
//! Real-time notification delivery for a signed-in client session: a push or
//! polling delivery channel, a reconciler that keeps the local store and unread
//! counter consistent, a toast queue with capacity and countdowns, and an
//! action dispatcher for optimistic user actions.

pub mod backend;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod toast;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use events::{ChannelState, InboundEvent, WireEvent};
pub use model::{Notification, NotificationAction, NotificationKind, Priority};
pub use service::{NotificationCenter, NotificationStats};
