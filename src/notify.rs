//! User-visible notification sink

use crate::types::{Notification, NotificationLevel};
use std::sync::{Mutex, PoisonError};

/// Toast-style sink for messages shown to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn success(&self, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Success,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.notify(Notification {
            level: NotificationLevel::Error,
            message: message.to_string(),
        });
    }
}

/// Forwards notifications to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => {
                tracing::info!(text = %notification.message, "Notification")
            }
            NotificationLevel::Error => {
                tracing::error!(text = %notification.message, "Notification")
            }
        }
    }
}

/// Records notifications for inspection
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything notified so far, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
