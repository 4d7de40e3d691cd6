//! Configuration for session orchestration
//!
//! [`ConnectionConfig`] describes *where* and *as whom* to connect and is built
//! once per orchestration attempt. [`OrchestratorConfig`] carries the timing and
//! retry policy applied by the orchestrator itself.
//!
//! # Examples
//!
//! ```rust
//! use rtc_orchestrator_core::config::{ConnectionConfig, SessionOptions};
//!
//! let config = ConnectionConfig::new("wss://signal.example.com", "token-123")
//!     .with_app_id("demo-app")
//!     .with_session_options(SessionOptions::default().with_query("region", "eu"));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.session_options.session_param, "room");
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::recovery::RetryConfig;

/// Query parameter used to scope a connection to a session when none is configured
pub const DEFAULT_SESSION_PARAM: &str = "room";

/// URL schemes accepted for the signaling endpoint
const SUPPORTED_SCHEMES: &[&str] = &["ws", "wss", "http", "https"];

/// Opaque identifier of the session (room) to join
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Options scoping the signaling connection to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Name of the query parameter carrying the session id
    pub session_param: String,
    /// Additional query parameters appended to the signaling URL, in order
    pub extra_query: Vec<(String, String)>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_param: DEFAULT_SESSION_PARAM.to_string(),
            extra_query: Vec::new(),
        }
    }
}

impl SessionOptions {
    /// Use a different query parameter name for the session id
    pub fn with_session_param(mut self, param: impl Into<String>) -> Self {
        self.session_param = param.into();
        self
    }

    /// Append an extra query parameter to the signaling URL
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query.push((key.into(), value.into()));
        self
    }
}

/// Immutable description of one signaling connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Signaling endpoint, e.g. `wss://signal.example.com`
    pub endpoint: String,
    /// Authentication token presented during the handshake
    pub auth_token: String,
    /// Application identifier passed to the signaling library (optional)
    #[serde(default)]
    pub app_id: Option<String>,
    /// Session scoping options
    #[serde(default)]
    pub session_options: SessionOptions,
}

// Keep the token out of logs
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("session_options", &self.session_options)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            app_id: None,
            session_options: SessionOptions::default(),
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Check the endpoint and token before any collaborator is touched
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(OrchestratorError::MissingConfiguration {
                field: "endpoint".to_string(),
            });
        }

        let parsed = url::Url::parse(&self.endpoint)
            .map_err(|e| OrchestratorError::invalid_configuration("endpoint", e.to_string()))?;
        if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
            return Err(OrchestratorError::invalid_configuration(
                "endpoint",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        if parsed.fragment().is_some() {
            return Err(OrchestratorError::invalid_configuration(
                "endpoint",
                "fragments are not allowed in a signaling endpoint",
            ));
        }

        if self.auth_token.is_empty() {
            return Err(OrchestratorError::MissingConfiguration {
                field: "auth_token".to_string(),
            });
        }

        if self.session_options.session_param.trim().is_empty() {
            return Err(OrchestratorError::invalid_configuration(
                "session_options.session_param",
                "parameter name must not be empty",
            ));
        }

        Ok(())
    }
}

/// Timing and retry policy for the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound for one connection attempt to settle
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Upper bound for joining the session
    #[serde(with = "duration_ms")]
    pub join_timeout: Duration,
    /// Upper bound for each individual teardown step
    #[serde(with = "duration_ms")]
    pub teardown_step_timeout: Duration,
    /// Retry policy for the connection step; a single attempt by default
    pub connect_retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            teardown_step_timeout: Duration::from_secs(5),
            connect_retry: RetryConfig::none(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_teardown_step_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_step_timeout = timeout;
        self
    }

    pub fn with_connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Load a configuration from JSON; missing fields take their defaults
    ///
    /// ```rust
    /// use rtc_orchestrator_core::config::OrchestratorConfig;
    /// use std::time::Duration;
    ///
    /// let config = OrchestratorConfig::from_json_str(r#"{ "connect_timeout": 2500 }"#).unwrap();
    /// assert_eq!(config.connect_timeout, Duration::from_millis(2500));
    /// assert_eq!(config.teardown_step_timeout, Duration::from_secs(5));
    /// ```
    pub fn from_json_str(json: &str) -> OrchestratorResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OrchestratorError::invalid_configuration("orchestrator", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("join_timeout", self.join_timeout),
            ("teardown_step_timeout", self.teardown_step_timeout),
        ] {
            if value.is_zero() {
                return Err(OrchestratorError::invalid_configuration(field, "must be greater than zero"));
            }
        }
        if self.connect_retry.max_attempts == 0 {
            return Err(OrchestratorError::invalid_configuration(
                "connect_retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        Ok(())
    }
}

/// Serialize a `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_validation() {
        assert!(ConnectionConfig::new("wss://x", "t").validate().is_ok());

        let err = ConnectionConfig::new("", "t").validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingConfiguration { ref field } if field == "endpoint"));

        let err = ConnectionConfig::new("ftp://x", "t").validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfiguration { .. }));

        let err = ConnectionConfig::new("not a url", "t").validate().unwrap_err();
        assert_eq!(err.category(), "configuration");

        let err = ConnectionConfig::new("wss://x", "").validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingConfiguration { ref field } if field == "auth_token"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ConnectionConfig::new("wss://x", "secret-token");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_connection_config_from_json() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "endpoint": "wss://x", "auth_token": "t" }"#).unwrap();
        assert_eq!(config.session_options, SessionOptions::default());
        assert!(config.app_id.is_none());
    }

    #[test]
    fn test_orchestrator_config_json_roundtrip_uses_millis() {
        let config = OrchestratorConfig::new().with_join_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["join_timeout"], 1500);

        let err = OrchestratorConfig::from_json_str(r#"{ "connect_timeout": 0 }"#).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfiguration { ref field, .. } if field == "connect_timeout"));
    }

    #[test]
    fn test_session_id() {
        assert!(SessionId::from("  ").is_empty());
        assert_eq!(SessionId::from("room1").to_string(), "room1");
    }
}
