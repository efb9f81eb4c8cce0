use async_trait::async_trait;
use tutoria_shared::models::Notification;

use crate::CollaboratorError;

/// Opaque e-mail/notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        tracing::info!(
            "Notification {:?} for {:?} on class request {}: {:?}",
            notification.event,
            notification.recipient,
            notification.class_request_id,
            notification.payload
        );
        Ok(())
    }
}
