//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of records in one pull page.
    pub max_pull_batch: usize,
    /// Expected `x-api-key` value; authentication is off when unset.
    pub api_key: Option<String>,
    /// Expected `x-secret-key` value.
    pub secret_key: Option<String>,
}

impl ServerConfig {
    /// Creates a configuration with default limits and no authentication.
    pub fn new() -> Self {
        Self {
            max_pull_batch: 100,
            api_key: None,
            secret_key: None,
        }
    }

    /// Sets the maximum pull page size. Zero is raised to one.
    pub fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size.max(1);
        self
    }

    /// Requires the given API key and secret on every request.
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Returns true if requests must be authenticated.
    pub fn require_auth(&self) -> bool {
        self.api_key.is_some() || self.secret_key.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
