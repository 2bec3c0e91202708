//! Command handlers for the `imc` binary.

#[cfg(feature = "testkit")]
pub mod replay;

use anyhow::Result;
use imc_config::{load_layered_yaml, ClientConfig, LoadedConfig};

pub fn config_hash(paths: &[String]) -> Result<()> {
    let loaded = load_paths(paths)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

fn load_paths(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&path_refs)
}

/// Layered config when paths are given, defaults otherwise; `target`
/// overrides the frame either way.
#[cfg_attr(not(feature = "testkit"), allow(dead_code))]
pub fn resolve_config(paths: &[String], target: Option<String>) -> Result<ClientConfig> {
    let mut config = if paths.is_empty() {
        ClientConfig::default()
    } else {
        let loaded = load_paths(paths)?;
        tracing::info!(config_hash = %loaded.config_hash, "config loaded");
        loaded.client
    };
    if let Some(t) = target {
        config.target_frame = t;
    }
    config.validate()?;
    Ok(config)
}
