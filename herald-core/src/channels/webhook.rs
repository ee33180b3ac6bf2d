//! JSON-over-HTTP channel adapter.
//!
//! Protocol, relative to the configured endpoint:
//!
//! - `POST   {endpoint}/messages` with an [`EventMessage`], answered by a
//!   [`CreatedMessage`]
//! - `PATCH  {endpoint}/messages/{message_id}` with an [`EventMessage`]
//! - `DELETE {endpoint}/messages/{message_id}`
//! - `GET    {endpoint}/messages/{message_id}/attendance`, answered by a
//!   list of [`AttendanceRecord`]
//!
//! When a secret is configured every request carries a `Herald-Signature`
//! header over its body (the empty string for bodiless requests).

use super::{ChannelAdapter, ChannelError};
use async_trait::async_trait;
use herald_sdk::objects::{AttendanceRecord, ChannelId, CreatedMessage, EventMessage};
use herald_sdk::signature::{SIGNATURE_HEADER, sign_json};
use reqwest::{Method, StatusCode};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookChannelConfig {
    pub id: ChannelId,
    pub name: String,
    pub endpoint: url::Url,
    pub secret: Option<String>,
}

pub struct WebhookChannel {
    id: ChannelId,
    name: String,
    endpoint: String,
    secret: Option<Box<[u8]>>,
    http_client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookChannelConfig, http_client: reqwest::Client) -> Self {
        Self {
            id: config.id,
            name: config.name,
            endpoint: config.endpoint.as_str().trim_end_matches('/').to_string(),
            secret: config.secret.map(|s| s.into_bytes().into_boxed_slice()),
            http_client,
        }
    }

    fn message_url(&self, message_id: &str) -> String {
        format!(
            "{}/messages/{}",
            self.endpoint,
            urlencoding::encode(message_id)
        )
    }

    fn request(&self, method: Method, url: String, body: String) -> reqwest::RequestBuilder {
        let mut request = self.http_client.request(method, url);
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_json(&body, secret));
        }
        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }
        request
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        message_id: Option<&str>,
    ) -> Result<reqwest::Response, ChannelError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some(message_id)) = (status, message_id) {
            return Err(ChannelError::MessageNotFound(message_id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn create_message(&self, message: &EventMessage) -> Result<String, ChannelError> {
        let body = serde_json::to_string(message)?;
        let url = format!("{}/messages", self.endpoint);
        let response = self
            .send(self.request(Method::POST, url, body), None)
            .await?;
        let created: CreatedMessage = response.json().await?;
        debug!(
            channel = %self.id,
            event_id = %message.event_id,
            message_id = %created.message_id,
            "Channel message created"
        );
        Ok(created.message_id)
    }

    async fn update_message(
        &self,
        message_id: &str,
        message: &EventMessage,
    ) -> Result<(), ChannelError> {
        let body = serde_json::to_string(message)?;
        self.send(
            self.request(Method::PATCH, self.message_url(message_id), body),
            Some(message_id),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), ChannelError> {
        let result = self
            .send(
                self.request(Method::DELETE, self.message_url(message_id), String::new()),
                Some(message_id),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // Already gone is what we wanted.
            Err(ChannelError::MessageNotFound(_)) => {
                debug!(channel = %self.id, message_id, "Message already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_attendance(
        &self,
        message_id: &str,
    ) -> Result<Vec<AttendanceRecord>, ChannelError> {
        let url = format!("{}/attendance", self.message_url(message_id));
        let response = self
            .send(
                self.request(Method::GET, url, String::new()),
                Some(message_id),
            )
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_path_encoded() {
        let channel = WebhookChannel::new(
            WebhookChannelConfig {
                id: ChannelId::from("forum"),
                name: "Forum".to_string(),
                endpoint: url::Url::parse("https://forum.example/api/").unwrap(),
                secret: None,
            },
            reqwest::Client::new(),
        );
        assert_eq!(
            channel.message_url("thread/42"),
            "https://forum.example/api/messages/thread%2F42"
        );
    }
}
