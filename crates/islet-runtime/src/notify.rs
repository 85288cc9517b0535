//! Session notifications.
//!
//! Deferred user-visible hints produced on the trusted side and
//! appended to each execution envelope. Dismissal is explicit; the list
//! lives in memory only and does not survive the process.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of hint this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// Something the user should look at.
    Warning,
    /// A suggestion.
    Tip,
    /// Something the user must do.
    Action,
}

/// One user-visible notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id, used for dismissal.
    pub id: Uuid,
    /// What kind of hint this is.
    pub kind: NotificationKind,
    /// The message shown to the user.
    pub message: String,
    /// A related entity (submission correlation id, binding name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
}

/// FIFO of pending notifications.
#[derive(Debug, Default)]
pub struct SessionNotifications {
    queue: RwLock<Vec<Notification>>,
}

impl SessionNotifications {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a notification, returning its id.
    pub fn push(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        related_id: Option<String>,
    ) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            related_id,
        };
        let id = notification.id;
        let mut queue = self.queue.write().unwrap_or_else(|e| {
            tracing::warn!("notification queue lock poisoned, recovering");
            e.into_inner()
        });
        queue.push(notification);
        id
    }

    /// Push an informational hint.
    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Info, message, None)
    }

    /// Push a warning.
    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Warning, message, None)
    }

    /// Push a tip.
    pub fn tip(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Tip, message, None)
    }

    /// Push an action item.
    pub fn action(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Action, message, None)
    }

    /// Snapshot the pending notifications, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<Notification> {
        let queue = self.queue.read().unwrap_or_else(|e| e.into_inner());
        queue.clone()
    }

    /// Dismiss one notification. Returns whether it existed.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
        let before = queue.len();
        queue.retain(|n| n.id != id);
        queue.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let notifications = SessionNotifications::new();
        notifications.info("first");
        notifications.warning("second");

        let pending = notifications.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].message, "first");
        assert_eq!(pending[1].kind, NotificationKind::Warning);
    }

    #[test]
    fn test_dismissal_is_explicit() {
        let notifications = SessionNotifications::new();
        let id = notifications.tip("use bindings");
        // Reading does not consume.
        assert_eq!(notifications.pending().len(), 1);
        assert!(notifications.dismiss(id));
        assert!(notifications.pending().is_empty());
        assert!(!notifications.dismiss(id));
    }
}
