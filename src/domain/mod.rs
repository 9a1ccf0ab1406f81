//! Domain layer for the keywarden credential engine
//!
//! This module contains core business logic, domain models and the ports
//! through which the engine reaches the outside world.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ProviderError, ProviderResult};
