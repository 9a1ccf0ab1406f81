//! Notification sink that writes to the tracing log.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::models::Severity;
use crate::domain::ports::{Notification, NotificationSink};

/// Writes notifications as tracing events.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    min_severity: Severity,
}

impl LogSink {
    /// Sink that drops anything below `min_severity`.
    pub const fn new(min_severity: Severity) -> Self {
        Self { min_severity }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    async fn deliver(&self, n: &Notification) -> anyhow::Result<()> {
        let target = n.target.as_deref().unwrap_or("-");
        match n.severity {
            Severity::Critical => error!(target_id = target, subject = %n.subject, "{}", n.body),
            Severity::Warning => warn!(target_id = target, subject = %n.subject, "{}", n.body),
            Severity::Ok => info!(target_id = target, subject = %n.subject, "{}", n.body),
        }
        Ok(())
    }
}
