//! Notification sink port.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::models::Severity;

/// A human-facing message about credential health or an operator action.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Drives sink filtering.
    pub severity: Severity,
    /// One-line summary.
    pub subject: String,
    /// Free text. Never contains secret material.
    pub body: String,
    /// `provider/principal` the message is about.
    pub target: Option<String>,
}

impl Notification {
    /// Message without a target.
    pub fn new(severity: Severity, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            subject: subject.into(),
            body: body.into(),
            target: None,
        }
    }

    /// Name the principal the message is about.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Best-effort delivery channel. Failures are logged by the caller, never propagated.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Lowest severity this sink wants to hear about.
    fn min_severity(&self) -> Severity;

    /// Send one notification.
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}
