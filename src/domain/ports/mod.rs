//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that adapters must implement:
//! - ProviderAdapter: identity control-plane operations
//! - AuditSink: append-only audit trail
//! - NotificationSink: best-effort operator notifications
//! - RecordStore: rotation and revocation records
//! - Clock: time source

pub mod audit_sink;
pub mod clock;
pub mod notification;
pub mod provider;
pub mod record_store;

pub use audit_sink::AuditSink;
pub use clock::Clock;
pub use notification::{Notification, NotificationSink};
pub use provider::ProviderAdapter;
pub use record_store::RecordStore;
