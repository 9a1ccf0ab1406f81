//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging and secret scrubbing
//! - Project setup and engine wiring

pub mod config;
pub mod logging;
pub mod setup;
