//! Adapters for external systems: control planes, storage, audit and
//! notification sinks.

pub mod audit;
pub mod clock;
pub mod notifications;
pub mod providers;
pub mod sqlite;
