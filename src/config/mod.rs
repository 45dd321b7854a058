//! Application and listener configuration.
//!
//! Both structs deserialize with `serde`; missing fields take their defaults, so
//! an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

/// Dispatcher settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log one line per request and one per response at `info` level.
    pub logging: bool,
}

impl AppConfig {
    /// Parses a JSON document such as `{"logging": true}`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Where [`Application::listen`](crate::Application::listen) binds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 80,
        }
    }
}

impl ServerConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parses a JSON document such as `{"hostname": "0.0.0.0", "port": 8080}`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The `host:port` string handed to the listener.
    ///
    /// ```
    /// use canopy::config::ServerConfig;
    ///
    /// assert_eq!(ServerConfig::new("0.0.0.0", 8080).address(), "0.0.0.0:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 80);
        assert_eq!(config.address(), "127.0.0.1:80");
    }

    #[test]
    fn server_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json(r#"{"port": 3000}"#).unwrap();
        assert_eq!(config, ServerConfig::new("127.0.0.1", 3000));
    }

    #[test]
    fn app_logging_off_by_default() {
        assert!(!AppConfig::default().logging);
        assert!(AppConfig::from_json(r#"{"logging": true}"#).unwrap().logging);
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerConfig::from_json(r#"{"port": "eighty"}"#).is_err());
    }
}
