//! Supervisor notifications, sent through the Gmail v1 API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::Message;
use serde::Serialize;
use tracing::info;

use crate::config::EmailSettings;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no email access token configured")]
    MissingToken,
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gmail api returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct RawMessage {
    raw: String,
}

pub struct GmailNotifier {
    client: reqwest::Client,
    settings: EmailSettings,
}

impl GmailNotifier {
    pub fn new(settings: EmailSettings) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Plain-text RFC 5322 message, base64url-encoded the way Gmail's `raw` field expects.
    fn encode(&self, subject: &str, body: &str) -> Result<String, NotifyError> {
        let message = Message::builder()
            .from(self.settings.from.parse()?)
            .to(self.settings.to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(base64::engine::general_purpose::URL_SAFE.encode(message.formatted()))
    }
}

#[async_trait]
impl NotificationSink for GmailNotifier {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let token = self
            .settings
            .access_token
            .as_deref()
            .ok_or(NotifyError::MissingToken)?;
        let raw = self.encode(subject, body)?;
        let url = format!(
            "{}/users/me/messages/send",
            self.settings.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&RawMessage { raw })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %self.settings.to, subject, "notification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> EmailSettings {
        EmailSettings {
            base_url,
            to: "nurse@example.com".to_string(),
            from: "robot@example.com".to_string(),
            access_token: Some("t0ken".to_string()),
            ..EmailSettings::default()
        }
    }

    fn decode(raw: &str) -> String {
        let bytes = base64::engine::general_purpose::URL_SAFE.decode(raw).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn encoded_message_carries_headers_and_body() {
        let notifier = GmailNotifier::new(settings("http://localhost".to_string())).unwrap();

        let raw = notifier.encode("Medicine out of stock", "Please refill.").unwrap();
        let text = decode(&raw);

        assert!(text.contains("To: nurse@example.com"));
        assert!(text.contains("From: robot@example.com"));
        assert!(text.contains("Subject: Medicine out of stock"));
        assert!(text.contains("Please refill."));
    }

    #[test]
    fn bad_addresses_are_rejected() {
        let mut s = settings("http://localhost".to_string());
        s.to = "not an address".to_string();
        let notifier = GmailNotifier::new(s).unwrap();

        assert!(matches!(
            notifier.encode("s", "b"),
            Err(NotifyError::Address(_))
        ));
    }

    #[tokio::test]
    async fn posts_raw_message_to_gmail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/me/messages/send"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "abc" })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = GmailNotifier::new(settings(server.uri())).unwrap();
        notifier.send_notification("subject", "body").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(decode(sent["raw"].as_str().unwrap()).contains("Subject: subject"));
    }

    #[tokio::test]
    async fn gmail_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let notifier = GmailNotifier::new(settings(server.uri())).unwrap();
        let err = notifier.send_notification("s", "b").await.unwrap_err();

        assert!(matches!(err, NotifyError::Api { status: 403, .. }));
    }
}
