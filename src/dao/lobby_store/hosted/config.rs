use super::error::{HostedDaoError, HostedResult};

const URL_ENV: &str = "PARTY_LOBBY_DATASTORE_URL";
const KEY_ENV: &str = "PARTY_LOBBY_DATASTORE_KEY";
const SCHEMA_ENV: &str = "PARTY_LOBBY_DATASTORE_SCHEMA";
const DEFAULT_SCHEMA: &str = "public";

/// Runtime configuration describing how to reach the hosted datastore.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub base_url: String,
    pub api_key: String,
    pub schema: String,
}

impl HostedConfig {
    /// Construct a configuration from the project URL and its public API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }

    /// Target another schema than `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> HostedResult<Self> {
        let base_url = std::env::var(URL_ENV)
            .map_err(|_| HostedDaoError::MissingEnvVar { var: URL_ENV })?;
        let api_key = std::env::var(KEY_ENV)
            .map_err(|_| HostedDaoError::MissingEnvVar { var: KEY_ENV })?;

        let mut config = Self::new(base_url, api_key);
        if let Some(schema) = std::env::var(SCHEMA_ENV).ok().filter(|s| !s.is_empty()) {
            config = config.with_schema(schema);
        }

        Ok(config)
    }

    /// Base URL of the row CRUD API.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    /// Websocket URL of the realtime service, API key included.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_service_urls() {
        let config = HostedConfig::new("https://demo.example.co/", "anon-key");
        assert_eq!(config.rest_url(), "https://demo.example.co/rest/v1");
        assert_eq!(
            config.realtime_url(),
            "wss://demo.example.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }
}
