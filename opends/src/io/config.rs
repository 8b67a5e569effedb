//! Tool configuration under `.opends/`.
//!
//! `settings.toml` holds backend settings edited by humans; `config.json`
//! records the active run and is rewritten by `select` and `init --select`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::json::{read_json, write_atomic, write_json};

/// Tool settings (TOML).
///
/// Missing fields take their defaults, so an absent file is equivalent to
/// the stock docker backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Container runtime binary (e.g. `docker`, `podman`).
    pub program: String,

    /// Where the package root is mounted inside the container.
    pub mount_point: String,

    /// Wall-clock limit for one execution or view, in seconds. Unset waits forever.
    pub timeout_secs: Option<u64>,

    /// Truncate captured container output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Extra arguments inserted after `run` options and before the image.
    pub extra_args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            mount_point: "/usr/src/app/datapackage".to_string(),
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
            extra_args: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let backend = &self.backend;
        if backend.program.trim().is_empty() {
            return Err(Error::Settings("backend.program must be non-empty".to_string()));
        }
        if !backend.mount_point.starts_with('/') {
            return Err(Error::Settings(
                "backend.mount_point must be an absolute path".to_string(),
            ));
        }
        if backend.timeout_secs == Some(0) {
            return Err(Error::Settings("backend.timeout_secs must be > 0".to_string()));
        }
        if backend.output_limit_bytes == 0 {
            return Err(Error::Settings(
                "backend.output_limit_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).map_err(|err| Error::io("read", path, err))?;
    let settings: Settings = toml::from_str(&contents)
        .map_err(|err| Error::Settings(format!("parse {}: {err}", path.display())))?;
    settings.validate()?;
    debug!(program = %settings.backend.program, "settings loaded");
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings)
        .map_err(|err| Error::Settings(format!("serialize settings: {err}")))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Per-checkout state: which run commands act on by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    pub run: Option<String>,
}

/// Load local config; a missing file means no run is selected.
pub fn load_local_config(path: &Path) -> Result<LocalConfig> {
    match read_json(path, "local config") {
        Err(Error::NotFound { .. }) => Ok(LocalConfig::default()),
        other => other,
    }
}

pub fn write_local_config(path: &Path, config: &LocalConfig) -> Result<()> {
    write_json(path, config)
}
