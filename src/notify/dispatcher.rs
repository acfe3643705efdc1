//! Fire-and-forget notification dispatch

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Notification, Notifier};

/// Spawns one task per notification; failures end in the log, nowhere else.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Send in the background. The handle is only for tests; handlers drop it.
    pub fn dispatch(&self, notification: Notification) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let chat_id = notification.chat_id;
            match notifier.send(&notification).await {
                Ok(()) => debug!(chat_id, "notification delivered"),
                Err(e) => warn!(chat_id, code = e.code(), error = %e, "notification failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::mock::RecordingNotifier;

    fn note(chat_id: i64) -> Notification {
        Notification {
            chat_id,
            text: "hi".into(),
            button: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        dispatcher.dispatch(note(5)).await.unwrap();
        assert_eq!(notifier.sent(), vec![note(5)]);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failure() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        // The task completes normally even though the send failed
        assert!(dispatcher.dispatch(note(6)).await.is_ok());
        assert_eq!(notifier.sent().len(), 1);
    }
}
