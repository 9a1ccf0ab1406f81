//! Time source port.

use chrono::{DateTime, Utc};

/// Source of "now". Services take a clock instead of calling `Utc::now()` so
/// that time-gated behavior is testable.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}
