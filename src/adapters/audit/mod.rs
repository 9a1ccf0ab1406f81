//! Audit sinks.

pub mod jsonl;
pub mod memory;

pub use jsonl::{parse_entries, JsonlAuditLog};
pub use memory::InMemoryAuditSink;
