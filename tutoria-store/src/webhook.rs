use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};
use tutoria_core::{CollaboratorError, Notifier};
use tutoria_shared::models::Notification;

/// Hands notifications to the external mail sender as JSON over HTTP.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to deliver notification {}: {}", notification.id, e);
                CollaboratorError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(
            "Delivered {:?} notification {} for class request {}",
            notification.event, notification.id, notification.class_request_id
        );
        Ok(())
    }
}
