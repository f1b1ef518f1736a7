//! Engine configuration
//!
//! [`EngineConfig`] holds the knobs that apply to every run of a compiled
//! graph. It can be built in code, read from environment variables, or parsed
//! from YAML:
//!
//! ```yaml
//! node_timeout_ms: 30000
//! parallel_nodes: true
//! ```
//!
//! | Variable | Field |
//! |---|---|
//! | `{PREFIX}NODE_TIMEOUT_MS` | `node_timeout` |
//! | `{PREFIX}PARALLEL_NODES` | `parallel_nodes` (`true/false/1/0/yes/no/on/off`) |
//!
//! Per-call settings (thread id, cancellation) live in
//! [`RunConfig`](crate::RunConfig).

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default prefix for [`EngineConfig::from_env`]
pub const DEFAULT_ENV_PREFIX: &str = "STATEGRAPH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single node invocation; exceeding it fails the run
    #[serde(
        rename = "node_timeout_ms",
        default,
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_timeout: Option<Duration>,

    /// Run the nodes of one step concurrently instead of one after another
    #[serde(default = "default_parallel")]
    pub parallel_nodes: bool,
}

fn default_parallel() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: None,
            parallel_nodes: default_parallel(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_parallel_nodes(mut self, parallel: bool) -> Self {
        self.parallel_nodes = parallel;
        self
    }

    /// Read overrides from `{prefix}NODE_TIMEOUT_MS` and `{prefix}PARALLEL_NODES`
    ///
    /// Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = get_env_parse::<u64>(&build_env_key(prefix, "node_timeout_ms"))? {
            config.node_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(parallel) = get_env_bool(&build_env_key(prefix, "parallel_nodes"))? {
            config.parallel_nodes = parallel;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| GraphError::Configuration(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_timeout == Some(Duration::ZERO) {
            return Err(GraphError::Configuration(
                "node_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(GraphError::Configuration(format!(
            "Environment variable {} contains invalid UTF-8",
            key
        ))),
    }
}

fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => {
            let parsed = val.trim().parse::<T>().map_err(|e| {
                GraphError::Configuration(format!(
                    "Failed to parse environment variable {}: {}",
                    key, e
                ))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(val) => {
            let result = match val.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(GraphError::Configuration(format!(
                        "Invalid boolean value for {}: {}",
                        key, val
                    )))
                }
            };
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

fn build_env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own prefix so parallel tests never share variables

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.node_timeout, None);
        assert!(config.parallel_nodes);
    }

    #[test]
    fn test_from_env_missing_uses_defaults() {
        let config = EngineConfig::from_env("SG_TEST_MISSING_12345_").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_from_env_reads_values() {
        env::set_var("SG_TEST_READ_NODE_TIMEOUT_MS", "1500");
        env::set_var("SG_TEST_READ_PARALLEL_NODES", "off");

        let config = EngineConfig::from_env("SG_TEST_READ_").unwrap();
        assert_eq!(config.node_timeout, Some(Duration::from_millis(1500)));
        assert!(!config.parallel_nodes);

        env::remove_var("SG_TEST_READ_NODE_TIMEOUT_MS");
        env::remove_var("SG_TEST_READ_PARALLEL_NODES");
    }

    #[test]
    fn test_from_env_rejects_bad_values() {
        env::set_var("SG_TEST_BAD_PARALLEL_NODES", "sometimes");
        assert!(EngineConfig::from_env("SG_TEST_BAD_").is_err());
        env::remove_var("SG_TEST_BAD_PARALLEL_NODES");

        env::set_var("SG_TEST_ZERO_NODE_TIMEOUT_MS", "0");
        let err = EngineConfig::from_env("SG_TEST_ZERO_").unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
        env::remove_var("SG_TEST_ZERO_NODE_TIMEOUT_MS");
    }

    #[test]
    fn test_from_yaml() {
        let config = EngineConfig::from_yaml("node_timeout_ms: 250\nparallel_nodes: false\n").unwrap();
        assert_eq!(config.node_timeout, Some(Duration::from_millis(250)));
        assert!(!config.parallel_nodes);

        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, EngineConfig::default());

        assert!(EngineConfig::from_yaml("parallel_nodes: [1, 2]").is_err());
    }

    #[test]
    fn test_serializes_timeout_as_millis() {
        let config = EngineConfig::new().with_node_timeout(Duration::from_secs(2));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, serde_json::json!({"node_timeout_ms": 2000, "parallel_nodes": true}));

        let back: EngineConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
