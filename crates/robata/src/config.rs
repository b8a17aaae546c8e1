//! Runner configuration.
//!
//! A [`RunnerConfig`] names a runner, carries the resource it asks for and
//! the flush policy of its batching path. It can be built in code, parsed
//! from JSON or read from `ROBATA_*` environment variables.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Result, RobataError};
use crate::resource::Resource;

pub const ENV_CPU: &str = "ROBATA_CPU";
pub const ENV_ACCELERATORS: &str = "ROBATA_ACCELERATORS";
pub const ENV_MAX_BATCH_SIZE: &str = "ROBATA_MAX_BATCH_SIZE";
pub const ENV_MAX_LATENCY_MS: &str = "ROBATA_MAX_LATENCY_MS";
pub const ENV_BATCHING: &str = "ROBATA_BATCHING";

/// Flush policy of one method's batching path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Route batchable methods through the batching path
    pub enabled: bool,
    /// Most callers merged into one group
    pub max_batch_size: usize,
    /// How long a group may wait for more callers once the first one arrived
    pub max_latency_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: 32,
            max_latency_ms: 10,
        }
    }
}

impl BatchingConfig {
    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    /// Batching is switched off; every call runs on its own.
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(RobataError::config("max_batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration of a single runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub name: String,
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Per-method replacements for `batching`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub method_batching: BTreeMap<String, BatchingConfig>,
}

impl RunnerConfig {
    /// A runner asking for one CPU with the default flush policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: Resource { cpu: 1.0, accelerator_count: 0.0 },
            batching: BatchingConfig::default(),
            method_batching: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Overrides the flush policy of one method.
    pub fn with_method_batching(mut self, method: impl Into<String>, batching: BatchingConfig) -> Self {
        self.method_batching.insert(method.into(), batching);
        self
    }

    /// Flush policy that applies to `method`.
    pub fn batching_for(&self, method: &str) -> &BatchingConfig {
        self.method_batching.get(method).unwrap_or(&self.batching)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env(name: impl Into<String>) -> Result<Self> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Like [`RunnerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(name: impl Into<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(name);
        if let Some(cpu) = parse_var::<f64, _>(&lookup, ENV_CPU)? {
            config.resource.cpu = cpu;
        }
        if let Some(count) = parse_var::<f64, _>(&lookup, ENV_ACCELERATORS)? {
            config.resource.accelerator_count = count;
        }
        if let Some(size) = parse_var(&lookup, ENV_MAX_BATCH_SIZE)? {
            config.batching.max_batch_size = size;
        }
        if let Some(ms) = parse_var(&lookup, ENV_MAX_LATENCY_MS)? {
            config.batching.max_latency_ms = ms;
        }
        if let Some(enabled) = parse_var(&lookup, ENV_BATCHING)? {
            config.batching.enabled = enabled;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RobataError::config("runner name must not be empty"));
        }
        self.resource.validate()?;
        self.batching.validate()?;
        for (method, batching) in &self.method_batching {
            batching
                .validate()
                .map_err(|err| RobataError::config(format!("method `{method}`: {err}")))?;
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| RobataError::config(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
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
    fn test_defaults() {
        let config = RunnerConfig::new("clf");
        assert!(config.batching.enabled);
        assert_eq!(config.batching.max_batch_size, 32);
        assert_eq!(config.batching.max_latency(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = RunnerConfig::from_json(
            r#"{
                "name": "clf",
                "resource": {"cpu": 2, "nvidia_gpu": 1},
                "batching": {"max_batch_size": 4},
                "method_batching": {"describe": {"enabled": false}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.resource, Resource::new(2.0, 1.0).unwrap());
        assert_eq!(config.batching.max_batch_size, 4);
        assert_eq!(config.batching.max_latency_ms, 10);
        assert!(!config.batching_for("describe").enabled);
        assert!(config.batching_for("predict").enabled);
    }

    #[test]
    fn test_from_json_rejects_zero_batch_size() {
        let err = RunnerConfig::from_json(r#"{"name": "clf", "batching": {"max_batch_size": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, RobataError::Config(_)));

        let err = RunnerConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, RobataError::Serialization(_)));
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = RunnerConfig::from_lookup(
            "clf",
            lookup(&[
                (ENV_CPU, "4"),
                (ENV_ACCELERATORS, "0.5"),
                (ENV_MAX_BATCH_SIZE, "16"),
                (ENV_MAX_LATENCY_MS, " 25 "),
                (ENV_BATCHING, "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.resource, Resource::new(4.0, 0.5).unwrap());
        assert_eq!(config.batching, BatchingConfig { enabled: false, max_batch_size: 16, max_latency_ms: 25 });
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = RunnerConfig::from_lookup("clf", lookup(&[(ENV_MAX_BATCH_SIZE, "many")])).unwrap_err();
        assert!(matches!(err, RobataError::Config(msg) if msg.contains(ENV_MAX_BATCH_SIZE)));

        let err = RunnerConfig::from_lookup("clf", lookup(&[(ENV_CPU, "-2")])).unwrap_err();
        assert!(matches!(err, RobataError::InvalidResource(_)));
    }
}
