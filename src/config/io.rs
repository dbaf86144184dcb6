use super::defaults::MAX_CONFIG_FILE_BYTES;
use super::Config;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Read and parse a config file, choosing the format by extension.
///
/// `.yaml`/`.yml` and `.toml` are parsed as such; anything else is read as
/// JSON5, which accepts plain JSON too.
pub fn read_config_file(path: &Path) -> Result<Config> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot stat config file '{}'", path.display()))?;

    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        bail!(
            "Config file '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_BYTES,
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    parse_config(&content, path)
}

fn parse_config(content: &str, path: &Path) -> Result<Config> {
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)
            .with_context(|| format!("Invalid YAML in '{}'", path.display()))?,
        Some("toml") => toml::from_str(content)
            .with_context(|| format!("Invalid TOML in '{}'", path.display()))?,
        _ => json5::from_str(content)
            .with_context(|| format!("Invalid JSON in '{}'", path.display()))?,
    };
    Ok(config)
}

/// Write configuration as pretty JSON.
pub fn write_config_file(path: &Path, config: &Config) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
