use anyhow::{Context, Result};
use imc_testkit::{load_session_json, replay, ReplayLine};
use tracing::info;

use super::resolve_config;

pub fn run(session_path: &str, config_paths: &[String], target: Option<String>) -> Result<()> {
    let config = resolve_config(config_paths, target)?;
    let session = load_session_json(session_path)?;
    info!(
        server_id = %session.server_id,
        steps = session.steps.len(),
        target_frame = %config.target_frame,
        "replaying session"
    );

    let lines = replay(&session, &config)?;
    let mut errors = 0usize;
    for line in &lines {
        if let ReplayLine::Callback { event, .. } = line {
            if event.is_error() {
                errors += 1;
            }
        }
        println!("{}", serde_json::to_string(line).context("serialize replay line")?);
    }
    info!(lines = lines.len(), errors, "replay finished");
    Ok(())
}
