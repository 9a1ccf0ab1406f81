use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

static PRIVATE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----")
        .expect("private key pattern")
});

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-_\.=]+").expect("bearer pattern"));

static SECRET_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"["']?(api_key|apikey|token|access_token|secret|secretText|client_secret|privateKeyData|private_key|password)["']?\s*([:=])\s*["']?[^"'\s,}]{8,}["']?"#,
    )
    .expect("secret field pattern")
});

/// Redacts key material and tokens from text that leaves the process:
/// audit `detail`, notification bodies, and error messages.
#[derive(Clone, Copy, Default)]
pub struct SecretScrubber;

impl SecretScrubber {
    /// Scrubber with the built-in patterns.
    pub const fn new() -> Self {
        Self
    }

    /// Scrub a message of sensitive data
    pub fn scrub_message(&self, message: &str) -> String {
        let scrubbed = PRIVATE_KEY.replace_all(message, "[PRIVATE_KEY_REDACTED]");
        let scrubbed = BEARER.replace_all(&scrubbed, "Bearer [TOKEN_REDACTED]");
        SECRET_FIELD
            .replace_all(&scrubbed, |caps: &Captures| {
                format!("{}{}[REDACTED]", &caps[1], &caps[2])
            })
            .into_owned()
    }

    /// Scrub every string inside a JSON value.
    pub fn scrub_value(&self, value: &serde_json::Value) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => Value::String(self.scrub_message(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.scrub_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.scrub_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for SecretScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScrubber").finish()
    }
}
