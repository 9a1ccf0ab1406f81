//! Best-effort notification fan-out.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::ports::{Notification, NotificationSink};
use crate::infrastructure::logging::SecretScrubber;

/// Delivers to every interested sink concurrently. Sink failures are logged
/// and swallowed; `notify` itself cannot fail.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
    scrubber: SecretScrubber,
}

impl Notifier {
    /// Notifier over `sinks`.
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            sinks,
            scrubber: SecretScrubber::new(),
        }
    }

    /// Number of configured sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Returns how many sinks accepted the notification.
    pub async fn notify(&self, notification: Notification) -> usize {
        let notification = Notification {
            body: self.scrubber.scrub_message(&notification.body),
            ..notification
        };

        let interested: Vec<_> = self
            .sinks
            .iter()
            .filter(|sink| notification.severity >= sink.min_severity())
            .collect();

        if interested.is_empty() {
            debug!(subject = %notification.subject, "no sink wants this notification");
            return 0;
        }

        let results = join_all(interested.iter().map(|sink| sink.deliver(&notification))).await;

        let mut delivered = 0;
        for (sink, result) in interested.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    sink = sink.name(),
                    subject = %notification.subject,
                    error = %err,
                    "notification delivery failed"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        min: Severity,
        fail: bool,
        seen: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        fn new(min: Severity, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                min,
                fail,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn min_severity(&self) -> Severity {
            self.min
        }

        async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(notification.clone());
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let broken = RecordingSink::new(Severity::Ok, true);
        let healthy = RecordingSink::new(Severity::Ok, false);
        let notifier = Notifier::new(vec![broken.clone(), healthy.clone()]);

        let delivered = notifier
            .notify(Notification::new(Severity::Critical, "expired", "key k1 expired"))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(broken.seen.lock().unwrap().len(), 1);
        assert_eq!(healthy.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_min_severity_filter() {
        let critical_only = RecordingSink::new(Severity::Critical, false);
        let notifier = Notifier::new(vec![critical_only.clone()]);

        assert_eq!(
            notifier
                .notify(Notification::new(Severity::Warning, "warn", "aging key"))
                .await,
            0
        );
        assert!(critical_only.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_is_scrubbed() {
        let sink = RecordingSink::new(Severity::Ok, false);
        let notifier = Notifier::new(vec![sink.clone()]);

        notifier
            .notify(Notification::new(
                Severity::Warning,
                "validation failed",
                "token endpoint rejected Bearer abc.defghijklmnop",
            ))
            .await;

        let seen = sink.seen.lock().unwrap();
        assert!(!seen[0].body.contains("abc.defghijklmnop"));
    }
}
