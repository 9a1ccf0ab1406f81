//! JSON webhook notification sink.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::models::Severity;
use crate::domain::ports::{Notification, NotificationSink};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    source: &'static str,
    severity: Severity,
    subject: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
}

/// POSTs notifications as JSON.
pub struct WebhookSink {
    http: Client,
    url: String,
    min_severity: Severity,
    timeout: Duration,
}

impl WebhookSink {
    /// Sink posting to `url`, giving up on a request after `timeout`.
    pub fn new(url: impl Into<String>, min_severity: Severity, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            min_severity,
            timeout,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = WebhookPayload {
            source: "keywarden",
            severity: notification.severity,
            subject: &notification.subject,
            body: &notification.body,
            target: notification.target.as_deref(),
        };

        let resp = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;

        if !resp.status().is_success() {
            bail!("webhook returned {}", resp.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_posts_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "source": "keywarden",
                "severity": "critical",
                "subject": "revoked",
                "target": "gcp:p/svc"
            })))
            .with_status(204)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/hook", server.url()), Severity::Warning, Duration::from_secs(5));
        let n = Notification::new(Severity::Critical, "revoked", "3 credentials").with_target("gcp:p/svc");
        sink.deliver(&n).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/hook").with_status(500).create_async().await;

        let sink = WebhookSink::new(format!("{}/hook", server.url()), Severity::Ok, Duration::from_secs(5));
        let err = sink
            .deliver(&Notification::new(Severity::Warning, "s", "b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
