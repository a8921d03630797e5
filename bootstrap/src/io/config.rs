//! Bootstrap configuration stored in `bootstrap.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::io::command::{CommandSettings, DEFAULT_OUTPUT_LIMIT_BYTES};

/// Bootstrap configuration (TOML).
///
/// Missing fields default to values that work for a project-local
/// `scripts/` layout invoked as `--scripts a.toml b.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Argument flag whose trailing tokens are script identifiers.
    pub flag: String,

    /// Directory joined onto identifiers when the direct load fails.
    pub base_dir: PathBuf,

    /// Truncate captured script stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Timeout for scripts whose manifest does not set one.
    pub default_timeout_secs: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            flag: "--scripts".to_string(),
            base_dir: PathBuf::from("scripts"),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            default_timeout_secs: None,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.flag.starts_with('-') || self.flag.trim_start_matches('-').is_empty() {
            return Err(anyhow!("flag must look like `--name`, got '{}'", self.flag));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.default_timeout_secs == Some(0) {
            return Err(anyhow!("default_timeout_secs must be > 0 when set"));
        }
        Ok(())
    }

    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            output_limit_bytes: self.output_limit_bytes,
            default_timeout: self.default_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BootstrapConfig::default()`.
pub fn load_config(path: &Path) -> Result<BootstrapConfig> {
    if !path.exists() {
        let cfg = BootstrapConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BootstrapConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
