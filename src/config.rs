//! Engine configuration.
//!
//! A small YAML document naming the connection-string environment variable
//! plus the default `OperationConfig` policy. No sentinel values — every
//! default is an explicit `#[serde(default = "...")]` function.

use serde::Deserialize;

/// Root configuration for a running engine instance.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub defaults: DefaultOperationPolicy,
}

/// Database connection configuration — the connection string itself never
/// lives in the config file, only the name of the environment variable
/// that holds it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Default policy applied to an `OperationConfig` when a caller leaves a
/// field unset — no sentinel values, no hidden mutation of the caller's
/// struct.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultOperationPolicy {
    #[serde(default = "default_missing_means_deleted")]
    pub missing_means_deleted: bool,
    #[serde(default = "default_cleanup_staging")]
    pub cleanup_staging: bool,
}

fn default_missing_means_deleted() -> bool {
    false
}

fn default_cleanup_staging() -> bool {
    true
}

impl Default for DefaultOperationPolicy {
    fn default() -> Self {
        Self {
            missing_means_deleted: default_missing_means_deleted(),
            cleanup_staging: default_cleanup_staging(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the Postgres connection string from the configured
    /// environment variable.
    pub fn connection_string(&self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(std::env::var(&self.database.connection_string_env)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let yaml = r#"
database:
  connection_string_env: "DIMLAKE_DATABASE_URL"
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.connection_string_env, "DIMLAKE_DATABASE_URL");
        assert_eq!(config.database.max_connections, 10);
        assert!(!config.defaults.missing_means_deleted);
        assert!(config.defaults.cleanup_staging);
    }

    #[test]
    fn parses_explicit_overrides() {
        let yaml = r#"
database:
  connection_string_env: "DIMLAKE_DATABASE_URL"
  max_connections: 25
defaults:
  missing_means_deleted: true
  cleanup_staging: false
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.max_connections, 25);
        assert!(config.defaults.missing_means_deleted);
        assert!(!config.defaults.cleanup_staging);
    }
}
