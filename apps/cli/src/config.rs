//! CLI configuration.
//!
//! Uploader settings are read as TOML from:
//! - Linux: `~/.config/chunkup/config.toml`
//! - Windows: `%APPDATA%/chunkup/config.toml`
//!
//! A missing default file means "all defaults"; a missing `--config` file is
//! an error. Command-line flags override whatever the file says.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkup_uploader::UploaderConfig;

/// Flags that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub chunk_size: Option<usize>,
    pub concurrent_limit: Option<usize>,
}

/// Loads the uploader configuration, applying `overrides` last.
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> anyhow::Result<UploaderConfig> {
    let mut config = match explicit {
        Some(path) => read_file(path)?,
        None => {
            let path = config_path();
            if path.exists() {
                read_file(&path)?
            } else {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                UploaderConfig::default()
            }
        }
    };

    apply_overrides(&mut config, overrides);
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> anyhow::Result<UploaderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn apply_overrides(config: &mut UploaderConfig, overrides: &Overrides) {
    if let Some(url) = &overrides.server_url {
        config.server_url = url.clone();
    }
    if let Some(size) = overrides.chunk_size {
        config.chunk_size = size;
    }
    if let Some(limit) = overrides.concurrent_limit {
        config.concurrent_limit = limit;
    }
}

/// Parses a byte size such as `1048576`, `512K`, `10M` or `1G` (binary units).
pub fn parse_size(input: &str) -> Result<usize, String> {
    let input = input.trim();
    let (digits, multiplier) = match input.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c.to_ascii_uppercase() {
                'K' => 1usize << 10,
                'M' => 1 << 20,
                'G' => 1 << 30,
                _ => return Err(format!("unknown size suffix '{c}'")),
            };
            (&input[..i], multiplier)
        }
        _ => (input, 1),
    };

    let value: usize = digits
        .parse()
        .map_err(|_| format!("invalid size '{input}'"))?;
    value
        .checked_mul(multiplier)
        .filter(|&n| n > 0)
        .ok_or_else(|| format!("size '{input}' is out of range"))
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkup").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkup")
            .join("config.toml")
    }
}
