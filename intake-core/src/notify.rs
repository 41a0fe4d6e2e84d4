//! Notifier seam
//!
//! The submission coordinator receives a [`Notifier`] as a capability built
//! once at startup. Delivery is best-effort: callers log the error and move on.

use async_trait::async_trait;

use crate::error::NotificationError;

/// An outgoing plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Destination address; `None` when the payload carried none.
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(to: Option<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The trimmed recipient, if there is a non-empty one.
    pub fn recipient(&self) -> Option<&str> {
        self.to.as_deref().map(str::trim).filter(|to| !to.is_empty())
    }
}

/// A mail transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;

    /// Short transport description for logs, e.g. `smtp.gmail.com:465`.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_trims_and_rejects_blank() {
        let n = Notification::new(Some("  a@example.com ".to_string()), "s", "b");
        assert_eq!(n.recipient(), Some("a@example.com"));

        let n = Notification::new(Some("   ".to_string()), "s", "b");
        assert_eq!(n.recipient(), None);

        let n = Notification::new(None, "s", "b");
        assert_eq!(n.recipient(), None);
    }
}
