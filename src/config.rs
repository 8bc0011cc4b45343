//! Configuration management for Quotagate.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{QuotagateError, Result};
use crate::ratelimit::{AdmissionPolicy, PolicyOverrides, RouteTable};

/// Prefix for environment overrides, e.g. `QUOTAGATE__LIMITER__LIMIT=20`.
const ENV_PREFIX: &str = "QUOTAGATE";

/// Main configuration for Quotagate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotagateConfig {
    /// Default policy applied when a request names no configured route
    #[serde(default)]
    pub limiter: PolicyOverrides,

    /// Per-route policy overrides keyed by resource scope
    #[serde(default)]
    pub routes: HashMap<String, PolicyOverrides>,

    /// Expired bucket sweeping
    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Janitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Minimum spacing between opportunistic sweeps in milliseconds
    #[serde(default)]
    pub sweep_interval_ms: u64,

    /// Interval of the background sweeper; disabled when unset
    #[serde(default)]
    pub background_interval_ms: Option<u64>,

    /// Initial capacity hint for the window store
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 0,
            background_interval_ms: None,
            store_capacity: default_store_capacity(),
        }
    }
}

fn default_store_capacity() -> usize {
    1024
}

impl QuotagateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QuotagateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QuotagateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional YAML file, then apply `QUOTAGATE__*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: QuotagateConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// The validated default policy.
    pub fn default_policy(&self) -> Result<AdmissionPolicy> {
        self.limiter.resolve(&AdmissionPolicy::default())
    }

    /// The validated route table.
    pub fn route_table(&self) -> Result<RouteTable> {
        RouteTable::from_overrides(&self.default_policy()?, &self.routes)
    }

    /// Build every policy once so bad values surface at startup.
    pub fn validate(&self) -> Result<()> {
        self.route_table()?;
        if self.janitor.background_interval_ms == Some(0) {
            return Err(QuotagateError::Config(
                "janitor.background_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = QuotagateConfig::default();
        let policy = config.default_policy().unwrap();

        assert_eq!(policy, AdmissionPolicy::default());
        assert_eq!(config.janitor.sweep_interval_ms, 0);
        assert!(config.janitor.background_interval_ms.is_none());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limiter:
  limit: 20
  window_ms: 30000
  max_backoff_multiplier: 4
routes:
  login:
    limit: 5
  "api/*":
    limit: 100
    window_ms: 1000
janitor:
  sweep_interval_ms: 250
  background_interval_ms: 10000
"#;
        let config = QuotagateConfig::from_yaml(yaml).unwrap();
        let policy = config.default_policy().unwrap();
        assert_eq!(policy.limit(), 20);
        assert_eq!(policy.window_ms(), 30_000);
        assert_eq!(policy.max_backoff_multiplier(), 4);
        assert_eq!(policy.route_key(), "global");

        let routes = config.route_table().unwrap();
        let login = routes.find("login").unwrap();
        assert_eq!(login.limit(), 5);
        assert_eq!(login.window_ms(), 30_000);
        assert_eq!(routes.find("api/items").unwrap().window_ms(), 1_000);

        assert_eq!(config.janitor.sweep_interval_ms, 250);
        assert_eq!(config.janitor.background_interval_ms, Some(10_000));
    }

    #[test]
    fn test_zero_limit_rejected_at_load() {
        let yaml = "limiter:\n  limit: 0\n";
        let err = QuotagateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, QuotagateError::InvalidPolicy { field: "limit", .. }));
    }

    #[test]
    fn test_zero_route_window_rejected_at_load() {
        let yaml = "routes:\n  login:\n    window_ms: 0\n";
        assert_err!(QuotagateConfig::from_yaml(yaml));
    }

    #[test]
    fn test_zero_background_interval_rejected() {
        let yaml = "janitor:\n  background_interval_ms: 0\n";
        assert_err!(QuotagateConfig::from_yaml(yaml));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = QuotagateConfig::from_yaml("limiter: [1, 2").unwrap_err();
        assert!(matches!(err, QuotagateError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("quotagate-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  limit: 3\nroutes:\n  login:\n    limit: 1\n").unwrap();

        let config = QuotagateConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.default_policy().unwrap().limit(), 3);
        assert_eq!(config.route_table().unwrap().find("login").unwrap().limit(), 1);
        assert_err!(QuotagateConfig::from_file(&path));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = QuotagateConfig::load(None).unwrap();
        assert_eq!(config.default_policy().unwrap().limit(), 10);
    }
}
