//! Notification sinks.

pub mod log;
pub mod webhook;

use std::sync::Arc;

use crate::domain::models::NotificationChannelConfig;
use crate::domain::ports::NotificationSink;

pub use log::LogSink;
pub use webhook::WebhookSink;

/// Build the sink a channel entry describes.
pub fn create_sink(config: &NotificationChannelConfig) -> Arc<dyn NotificationSink> {
    match config {
        NotificationChannelConfig::Webhook {
            url,
            min_severity,
            timeout,
        } => Arc::new(WebhookSink::new(url.clone(), *min_severity, *timeout)),
        NotificationChannelConfig::Log { min_severity } => Arc::new(LogSink::new(*min_severity)),
    }
}
