use super::ChannelError;
use async_trait::async_trait;
use herald_sdk::objects::ReminderNotice;
use herald_sdk::signature::{SIGNATURE_HEADER, sign_json};
use tracing::info;

/// Delivers fired reminders to their recipients.
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn deliver(&self, notice: &ReminderNotice) -> Result<(), ChannelError>;
}

/// Posts a signed [`ReminderNotice`] to a notification endpoint.
pub struct WebhookReminderNotifier {
    url: url::Url,
    secret: Option<Box<[u8]>>,
    http_client: reqwest::Client,
}

impl WebhookReminderNotifier {
    pub fn new(url: url::Url, secret: Option<String>, http_client: reqwest::Client) -> Self {
        Self {
            url,
            secret: secret.map(|s| s.into_bytes().into_boxed_slice()),
            http_client,
        }
    }
}

#[async_trait]
impl ReminderNotifier for WebhookReminderNotifier {
    async fn deliver(&self, notice: &ReminderNotice) -> Result<(), ChannelError> {
        let body = serde_json::to_string(notice)?;
        let mut request = self
            .http_client
            .post(self.url.clone())
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_json(&body, secret));
        }
        let response = request.body(body).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Logs reminders instead of sending them. Used when no endpoint is set.
pub struct TracingReminderNotifier;

#[async_trait]
impl ReminderNotifier for TracingReminderNotifier {
    async fn deliver(&self, notice: &ReminderNotice) -> Result<(), ChannelError> {
        info!(
            event_id = %notice.event_id,
            slot = %notice.slot,
            recipients = notice.recipients.len(),
            title = %notice.title,
            "Reminder due"
        );
        Ok(())
    }
}
