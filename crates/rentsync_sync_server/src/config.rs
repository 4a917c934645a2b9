//! Server configuration.

/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/cars/sync/pull";

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/users/sync";

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path answering `GET` pulls.
    pub pull_path: String,
    /// Path accepting `POST` pushes.
    pub push_path: String,
    /// Maximum number of changes in one pull response.
    pub max_pull_batch: usize,
    /// Maximum number of entries in one push request.
    pub max_push_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with the default endpoints.
    pub fn new() -> Self {
        Self {
            pull_path: PULL_PATH.to_string(),
            push_path: PUSH_PATH.to_string(),
            max_pull_batch: 500,
            max_push_batch: 500,
        }
    }

    /// Sets the pull endpoint path.
    pub fn with_pull_path(mut self, path: impl Into<String>) -> Self {
        self.pull_path = path.into();
        self
    }

    /// Sets the push endpoint path.
    pub fn with_push_path(mut self, path: impl Into<String>) -> Self {
        self.push_path = path.into();
        self
    }

    /// Sets the maximum pull batch size.
    pub fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.pull_path, "/cars/sync/pull");
        assert_eq!(config.push_path, "/users/sync");
        assert_eq!(config.max_pull_batch, 500);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_pull_path("/sync/pull")
            .with_max_pull_batch(50)
            .with_max_push_batch(10);

        assert_eq!(config.pull_path, "/sync/pull");
        assert_eq!(config.max_pull_batch, 50);
        assert_eq!(config.max_push_batch, 10);
    }
}
