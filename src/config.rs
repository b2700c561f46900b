// Client configuration
// One immutable value per logical session; the client keeps it behind an Arc

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Name of the document subtype used to materialize a nested value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKind(String);

impl DocumentKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentKind {
    fn default() -> Self {
        Self("Document".to_string())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Field name -> document kind, resolved when a document is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassMapping(BTreeMap<String, DocumentKind>);

impl ClassMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, kind: DocumentKind) -> Self {
        self.0.insert(field.into(), kind);
        self
    }

    pub fn get(&self, field: &str) -> Option<&DocumentKind> {
        self.0.get(field)
    }

    // Falls back to the default kind for unmapped fields
    pub fn kind_for(&self, field: &str) -> DocumentKind {
        self.get(field).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapiConfig {
    // Prefix for every request url
    pub base_url: String,
    pub http_user_name: Option<String>,
    pub http_password: Option<String>,
    pub host: String,
    pub port: u16,
    pub path: String,
    // API key sent with search parameters
    pub key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub class_mapping: ClassMapping,
}

impl Default for TapiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            http_user_name: None,
            http_password: None,
            host: "localhost".to_string(),
            port: 80,
            path: String::new(),
            key: None,
            timeout_ms: None,
            class_mapping: ClassMapping::default(),
        }
    }
}

impl TapiConfig {
    // "user:pass" when both halves are configured
    pub fn http_authentication(&self) -> Option<String> {
        self.basic_auth()
            .map(|(user, password)| format!("{}:{}", user, password))
    }

    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.http_user_name, &self.http_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn api_url(&self) -> String {
        let port = if self.port == 80 {
            String::new()
        } else {
            format!(":{}", self.port)
        };
        format!("http://{}{}{}", self.host, port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_requires_both_parts() {
        let mut config = TapiConfig::default();
        assert_eq!(config.http_authentication(), None);

        config.http_user_name = Some("username".to_string());
        assert_eq!(config.http_authentication(), None);

        config.http_password = Some("password".to_string());
        assert_eq!(
            config.http_authentication(),
            Some("username:password".to_string())
        );
    }

    #[test]
    fn test_api_url_omits_default_port() {
        let mut config = TapiConfig {
            host: "api.example.com".to_string(),
            path: "/api/v3".to_string(),
            ..Default::default()
        };
        assert_eq!(config.api_url(), "http://api.example.com/api/v3");

        config.port = 8080;
        assert_eq!(config.api_url(), "http://api.example.com:8080/api/v3");
    }

    #[test]
    fn test_config_from_json() {
        let config: TapiConfig = serde_json::from_str(
            r#"{
                "host": "host",
                "port": 1,
                "path": "path",
                "key": "key",
                "class_mapping": {"data": "Data"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.api_url(), "http://host:1path");
        assert_eq!(config.key.as_deref(), Some("key"));
        assert_eq!(config.class_mapping.kind_for("data"), DocumentKind::new("Data"));
        assert_eq!(config.class_mapping.kind_for("other"), DocumentKind::default());
    }
}
