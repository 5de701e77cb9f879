use crate::errors::Result;
use crate::merge::MergeOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_CACHE_MAX_COST: u64 = 100 << 20;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000_000;

pub const ENV_CACHE_MAX_COST: &str = "REFEVAL_CACHE_MAX_COST";
pub const ENV_CACHE_MAX_ENTRIES: &str = "REFEVAL_CACHE_MAX_ENTRIES";
pub const ENV_CACHE_DISABLE: &str = "REFEVAL_CACHE_DISABLE";

/// Bounds for the reference cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total estimated cost (roughly bytes) the cache may hold.
    pub max_cost: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cost: DEFAULT_CACHE_MAX_COST,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Reads cache bounds from the process environment. `None` means the
    /// cache is disabled.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CacheConfig::from_env`] with a caller-supplied lookup.
    /// Unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup(ENV_CACHE_DISABLE).is_some_and(|v| is_truthy(&v)) {
            return None;
        }
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CACHE_MAX_COST) {
            match raw.trim().parse() {
                Ok(cost) => config.max_cost = cost,
                Err(_) => tracing::warn!(var = ENV_CACHE_MAX_COST, value = %raw, "ignoring invalid cache setting"),
            }
        }
        if let Some(raw) = lookup(ENV_CACHE_MAX_ENTRIES) {
            match raw.trim().parse() {
                Ok(entries) => config.max_entries = entries,
                Err(_) => tracing::warn!(var = ENV_CACHE_MAX_ENTRIES, value = %raw, "ignoring invalid cache setting"),
            }
        }
        Some(config)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Serializable evaluator settings. Capabilities (scopes, hooks, resolvers)
/// are attached through the builder, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub max_depth: usize,
    /// Options used for inline merges when a reference carries no `!merge:` suffix.
    pub inline_merge: MergeOptions,
    pub cache: Option<CacheConfig>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            inline_merge: MergeOptions::default(),
            cache: None,
        }
    }
}

impl EvaluatorConfig {
    /// Parses YAML or JSON (JSON being a subset of YAML).
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}
