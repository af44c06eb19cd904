use crate::core::{CatalogError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_MAX_CONNECTIONS: &str = "CINEDB_MAX_CONNECTIONS";
pub const ENV_MIN_CONNECTIONS: &str = "CINEDB_MIN_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "CINEDB_CONNECT_TIMEOUT_MS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "CINEDB_LOCK_TIMEOUT_MS";
pub const ENV_CASE_SENSITIVE_SEARCH: &str = "CINEDB_CASE_SENSITIVE_SEARCH";
pub const ENV_SNAPSHOT_PATH: &str = "CINEDB_SNAPSHOT_PATH";

/// Catalog configuration
///
/// Built once at startup and handed to [`crate::Catalog::open`].
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections kept warm in the pool
    pub min_connections: usize,

    /// How long to wait for a free pooled connection
    pub connect_timeout: Duration,

    /// How long a single store call may wait for a table lock
    pub lock_timeout: Duration,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,

    /// Whether title search matches case exactly (SQL `LIKE` semantics)
    pub case_sensitive_search: bool,

    /// Where the store snapshot is loaded from and saved to
    pub snapshot_path: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn new() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            case_sensitive_search: true,
            snapshot_path: None,
        }
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn case_sensitive_search(mut self, enabled: bool) -> Self {
        self.case_sensitive_search = enabled;
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Build a configuration from `CINEDB_*` environment variables, falling
    /// back to the defaults of [`CatalogConfig::new`] for unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CatalogConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = parse_var(ENV_MAX_CONNECTIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MIN_CONNECTIONS) {
            config.min_connections = parse_var(ENV_MIN_CONNECTIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout =
                Duration::from_millis(parse_var(ENV_CONNECT_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_LOCK_TIMEOUT_MS) {
            config.lock_timeout = Duration::from_millis(parse_var(ENV_LOCK_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_CASE_SENSITIVE_SEARCH) {
            config.case_sensitive_search = parse_var(ENV_CASE_SENSITIVE_SEARCH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SNAPSHOT_PATH)
            && !raw.trim().is_empty()
        {
            config.snapshot_path = Some(PathBuf::from(raw));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(CatalogError::Config("max_connections must be > 0".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(CatalogError::Config(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.lock_timeout.is_zero() {
            return Err(CatalogError::Config("lock_timeout must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CatalogError::Config(format!("{} has invalid value '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.max_connections, 10);
        assert!(config.case_sensitive_search);
        assert!(config.snapshot_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = CatalogConfig::new()
            .max_connections(20)
            .min_connections(2)
            .lock_timeout(Duration::from_millis(250))
            .case_sensitive_search(false)
            .snapshot_path("/tmp/catalog.snap");

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert!(!config.case_sensitive_search);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/catalog.snap")));
    }

    #[test]
    fn test_from_lookup() {
        let config = CatalogConfig::from_lookup(lookup(&[
            (ENV_MAX_CONNECTIONS, "4"),
            (ENV_LOCK_TIMEOUT_MS, "1500"),
            (ENV_CASE_SENSITIVE_SEARCH, "false"),
            (ENV_SNAPSHOT_PATH, "data/catalog.snap"),
        ]))
        .unwrap();

        assert_eq!(config.max_connections, 4);
        assert_eq!(config.lock_timeout, Duration::from_millis(1500));
        assert!(!config.case_sensitive_search);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("data/catalog.snap")));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = CatalogConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "many")])).unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn test_validate() {
        assert!(CatalogConfig::new().max_connections(0).validate().is_err());

        let invalid_min_max = CatalogConfig::new().min_connections(10).max_connections(5);
        assert!(invalid_min_max.validate().is_err());

        let zero_lock = CatalogConfig::new().lock_timeout(Duration::ZERO);
        assert!(zero_lock.validate().is_err());
    }
}
