//! imc-config
//!
//! Layered YAML configuration for a marker client.
//!
//! - Docs are merged in order: earlier docs are base, later docs override.
//! - The merged document is canonicalised to JSON and hashed (SHA-256) so two
//!   runs can prove they used the same effective config.
//! - The merged document is then decoded into a typed [`ClientConfig`].
//!   Unknown keys are an error, not a warning: a misspelt `keep_alive_secs`
//!   must not silently fall back to the default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::time::Duration;

mod classification;

pub use classification::{FailureCause, FailureClassification, FailureKind};

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

pub const DEFAULT_KEEP_ALIVE_SECS: f64 = 10.0;
pub const DEFAULT_ADVANCE_INTERVAL_MS: u64 = 100;

/// Everything a per-server client needs at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Frame all emitted geometry is expressed in.
    pub target_frame: String,

    /// Maximum time without a successful emission while entries are pending.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: f64,

    /// Cadence of the periodic driver. The client itself never reads this.
    #[serde(default = "default_advance_interval_ms")]
    pub advance_interval_ms: u64,

    #[serde(default)]
    pub failures: FailureClassification,
}

fn default_keep_alive_secs() -> f64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_advance_interval_ms() -> u64 {
    DEFAULT_ADVANCE_INTERVAL_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_target("map")
    }
}

impl ClientConfig {
    pub fn for_target(target_frame: impl Into<String>) -> Self {
        Self {
            target_frame: target_frame.into(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            advance_interval_ms: DEFAULT_ADVANCE_INTERVAL_MS,
            failures: FailureClassification::default(),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = keep_alive.as_secs_f64();
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::try_from_secs_f64(self.keep_alive_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn advance_interval(&self) -> Duration {
        Duration::from_millis(self.advance_interval_ms)
    }

    /// Reject configs the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target_frame.trim().is_empty() {
            bail!("CONFIG_INVALID: target_frame must not be empty");
        }
        if !self.keep_alive_secs.is_finite() || self.keep_alive_secs <= 0.0 {
            bail!(
                "CONFIG_INVALID: keep_alive_secs must be a positive number (got {})",
                self.keep_alive_secs
            );
        }
        if self.advance_interval_ms == 0 {
            bail!("CONFIG_INVALID: advance_interval_ms must be > 0");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
    pub client: ClientConfig,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        if v_yaml.is_null() {
            // Empty overlay file.
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());

    let client: ClientConfig = serde_json::from_value(merged.clone())
        .context("config does not match the client schema")?;
    client.validate()?;

    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
        client,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Serialise with object keys sorted at every level so key order in the
/// source YAML never changes the hash.
fn canonicalize_json(v: &Value) -> Result<String> {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let a = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 1});
        let b = serde_json::json!({"a": {"y": 3}});
        let m = deep_merge(a, b);
        assert_eq!(m, serde_json::json!({"a": {"x": 1, "y": 3}, "b": 1}));
    }

    #[test]
    fn default_config_is_valid() {
        ClientConfig::default().validate().unwrap();
    }
}
