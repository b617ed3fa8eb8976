use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default connect/request timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Options applied to the channel a `Reporter` builds for its destination.
///
/// Deserializes from camelCase JSON so it can sit inside a larger config file:
///
/// ```json
/// { "connectTimeoutMs": 5000, "requestTimeoutMs": 2000, "userAgent": "edge-agent/2.1" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterOptions {
    /// Upper bound on establishing the WebSocket connection.
    pub connect_timeout_ms: u64,
    /// Upper bound on one HTTP POST, response included.
    pub request_timeout_ms: u64,
    /// `User-Agent` sent with every HTTP request and the WebSocket handshake.
    pub user_agent: String,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("stats-reporter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ReporterOptions {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let opts: ReporterOptions = serde_json::from_str(r#"{ "requestTimeoutMs": 250 }"#).unwrap();
        assert_eq!(opts.request_timeout(), Duration::from_millis(250));
        assert_eq!(opts.connect_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(opts.user_agent.starts_with("stats-reporter/"));
    }
}
