//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with optional
//! rolling JSON files, plus redaction of key material before text leaves
//! the process.

/// Subscriber setup.
pub mod logger;
/// Secret redaction.
pub mod secret_scrubbing;

pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubber;
