//! Connection configuration for one Weaviate instance.

use serde::Deserialize;

use crate::error::ApiError;

/// Port every Weaviate instance listens on.
pub const DEFAULT_PORT: u16 = 8070;

/// Path prefix of the REST surface.
pub const API_PREFIX: &str = "/weaviate/v1";

/// Where and how to reach a Weaviate instance.
///
/// Immutable once built; the client clones what it needs from it. Field
/// names on the wire follow the import scripts' config files (`token`,
/// `location`, `urlport`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "token")]
    api_token: String,
    #[serde(rename = "location")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(rename = "urlport", default)]
    location_url: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionConfig {
    pub fn new(api_token: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            location_url: None,
        }
    }

    /// Override the URL written into cross-references. Defaults to
    /// `http://<host>:<port>`.
    pub fn with_location_url(mut self, location_url: impl Into<String>) -> Self {
        self.location_url = Some(location_url.into());
        self
    }

    /// Override the port. Only local deployments (and the mock server)
    /// listen anywhere other than 8070.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Read `WEAVIATE_API_TOKEN`, `WEAVIATE_HOST` and the optional
    /// `WEAVIATE_PORT` / `WEAVIATE_LOCATION_URL` from the environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let api_token = lookup("WEAVIATE_API_TOKEN")
            .ok_or_else(|| ApiError::Config("WEAVIATE_API_TOKEN is not set".to_string()))?;
        let host = lookup("WEAVIATE_HOST")
            .ok_or_else(|| ApiError::Config("WEAVIATE_HOST is not set".to_string()))?;

        let mut config = Self::new(api_token, host);
        if let Some(port) = lookup("WEAVIATE_PORT") {
            let port = port
                .parse()
                .map_err(|_| ApiError::Config(format!("WEAVIATE_PORT {port:?} is not a port number")))?;
            config = config.with_port(port);
        }
        if let Some(location_url) = lookup("WEAVIATE_LOCATION_URL") {
            config = config.with_location_url(location_url);
        }
        Ok(config)
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://<host>:<port>/weaviate/v1`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}{API_PREFIX}", self.host, self.port)
    }

    pub fn location_url(&self) -> String {
        match &self.location_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn base_url_uses_fixed_port_and_prefix() {
        let config = ConnectionConfig::new("secret", "10.0.0.7");
        assert_eq!(config.port(), 8070);
        assert_eq!(config.base_url(), "http://10.0.0.7:8070/weaviate/v1");
        assert_eq!(config.location_url(), "http://10.0.0.7:8070");
    }

    #[test]
    fn location_url_override_is_kept() {
        let config = ConnectionConfig::new("secret", "localhost").with_location_url("http://host:8070");
        assert_eq!(config.location_url(), "http://host:8070");
        assert_eq!(config.base_url(), "http://localhost:8070/weaviate/v1");
    }

    #[test]
    fn deserializes_import_script_config() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"token":"abc","location":"weaviate.local","urlport":"http://weaviate.local:8070"}"#,
        )
        .unwrap();
        assert_eq!(config.api_token(), "abc");
        assert_eq!(config.host(), "weaviate.local");
        assert_eq!(config.port(), 8070);
        assert_eq!(config.location_url(), "http://weaviate.local:8070");
    }

    #[test]
    fn from_lookup_requires_token_and_host() {
        let vars: HashMap<&str, &str> = HashMap::from([("WEAVIATE_HOST", "localhost")]);
        let err = ConnectionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ApiError::Config(msg) if msg.contains("WEAVIATE_API_TOKEN")));
    }

    #[test]
    fn from_lookup_applies_optional_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WEAVIATE_API_TOKEN", "tok"),
            ("WEAVIATE_HOST", "127.0.0.1"),
            ("WEAVIATE_PORT", "9000"),
            ("WEAVIATE_LOCATION_URL", "http://public:8070"),
        ]);
        let config = ConnectionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url(), "http://127.0.0.1:9000/weaviate/v1");
        assert_eq!(config.location_url(), "http://public:8070");
    }

    #[test]
    fn from_lookup_rejects_bad_port() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WEAVIATE_API_TOKEN", "tok"),
            ("WEAVIATE_HOST", "127.0.0.1"),
            ("WEAVIATE_PORT", "eighty"),
        ]);
        let err = ConnectionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
