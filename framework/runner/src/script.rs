use std::path::Path;

use anyhow::Context;
use surge_core::prelude::Script;

use crate::types::SurgeResult;

/// Load and validate a script. YAML and JSON are both accepted.
pub fn load_script(path: &Path) -> SurgeResult<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script '{}'", path.display()))?;
    let script: Script = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse script '{}'", path.display()))?;
    script.validate()?;

    Ok(script)
}

/// Load the JSON payload that is handed to every worker.
pub fn load_payload(path: &Path) -> SurgeResult<serde_json::Value> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open payload '{}'", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse payload '{}' as JSON", path.display()))
}
