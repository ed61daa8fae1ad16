//! Configuration management for the Portal relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "PORTAL_RELAYER_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    /// Defaults to a random id when empty
    #[serde(default)]
    pub instance_id: String,
    /// Portal address of the party this relayer acts for
    pub portal_address: String,
    /// Wall-clock deadline for deposits and swap completion waits
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// How long an out-of-order event may wait for its predecessors
    #[serde(default = "default_queue_ttl_secs")]
    pub queue_ttl_secs: u64,
    /// Deadline for a single chain adapter call
    #[serde(default = "default_chain_call_timeout_secs")]
    pub chain_call_timeout_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_operation_timeout_secs() -> u64 {
    300
}

fn default_queue_ttl_secs() -> u64 {
    300
}

fn default_chain_call_timeout_secs() -> u64 {
    120
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_health_check_interval_secs() -> u64 {
    30
}

impl RelayerConfig {
    /// Minimal configuration for a relayer acting for `portal_address`
    pub fn new(portal_address: impl Into<String>) -> Self {
        Self {
            instance_id: String::new(),
            portal_address: portal_address.into(),
            operation_timeout_secs: default_operation_timeout_secs(),
            queue_ttl_secs: default_queue_ttl_secs(),
            chain_call_timeout_secs: default_chain_call_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the built-in average block time
    pub avg_block_time_secs: Option<u64>,
    /// Overrides the built-in safety depth
    pub safety_depth: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Settings {
    /// Load settings from the file named by `PORTAL_RELAYER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let mut settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        if settings.relayer.instance_id.is_empty() {
            settings.relayer.instance_id = uuid::Uuid::new_v4().to_string();
        }

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.relayer.portal_address.trim().is_empty() {
            anyhow::bail!("relayer.portal_address must be set");
        }

        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, value) in [
            ("operation_timeout_secs", self.relayer.operation_timeout_secs),
            ("queue_ttl_secs", self.relayer.queue_ttl_secs),
            ("chain_call_timeout_secs", self.relayer.chain_call_timeout_secs),
            ("cleanup_interval_secs", self.relayer.cleanup_interval_secs),
            ("health_check_interval_secs", self.relayer.health_check_interval_secs),
        ] {
            if value == 0 {
                anyhow::bail!("relayer.{} must be positive", name);
            }
        }

        // Unknown chains must bring their own parameters
        crate::chain::ChainParamsTable::from_config(self.enabled_chains())?;

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static! {
        static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [relayer]
        portal_address = "${PORTAL_TEST_ADDRESS}"
        queue_ttl_secs = 120

        [chains.ethereum]

        [chains.lightning]
        safety_depth = 3

        [chains.custom]
        enabled = false
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("PORTAL_TEST_ADDRESS", "0xabc123");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.relayer.portal_address, "0xabc123");
        assert_eq!(settings.relayer.queue_ttl_secs, 120);
        assert_eq!(settings.relayer.operation_timeout_secs, 300);
        assert!(!settings.relayer.instance_id.is_empty());
        assert_eq!(settings.enabled_chains().len(), 2);
        assert!(settings.api.enabled);
        assert!(!settings.metrics.enabled);
    }

    #[test]
    fn test_rejects_missing_address_and_unknown_chain_params() {
        let no_address = r#"
            [relayer]
            portal_address = ""
            [chains.ethereum]
        "#;
        assert!(Settings::from_toml(no_address).is_err());

        let unknown_chain = r#"
            [relayer]
            portal_address = "0xabc"
            [chains.mychain]
        "#;
        assert!(Settings::from_toml(unknown_chain).is_err());

        let configured_chain = r#"
            [relayer]
            portal_address = "0xabc"
            [chains.mychain]
            avg_block_time_secs = 5
            safety_depth = 10
        "#;
        assert!(Settings::from_toml(configured_chain).is_ok());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let zero_ttl = r#"
            [relayer]
            portal_address = "0xabc"
            queue_ttl_secs = 0
            [chains.ethereum]
        "#;
        assert!(Settings::from_toml(zero_ttl).is_err());
    }
}
