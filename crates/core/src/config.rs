//! Application configuration.
//!
//! Settings are read from `<config_dir>/railsim/config.toml` and can be
//! overridden with `RAILSIM_*` environment variables, e.g.
//! `RAILSIM_TICK_MS=100`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::{Mode, SimulationContext};

/// Directory under the user's config directory holding `config.toml`.
pub const CONFIG_DIR: &str = "railsim";

const DEFAULT_CONFIG: &str = r#"# railsim configuration

# Speed limit in m/s for items without one of their own.
default_max_speed = 18.0

# Snapping step for positions in the editor.
grid = 5.0

# Wall-clock period of a simulation tick, in milliseconds.
tick_ms = 500

# Simulated seconds per tick.
time_step = 1.0
"#;

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Speed limit in m/s used for items whose own limit is `0`.
    pub default_max_speed: f64,
    /// Editor snapping step.
    pub grid: f64,
    /// Tick period of the simulation loop.
    pub tick_ms: u64,
    /// Simulated seconds per tick.
    pub time_step: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_max_speed: 18.0,
            grid: 5.0,
            tick_ms: 500,
            time_step: 1.0,
        }
    }
}

impl AppConfig {
    /// Load from the default location plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` plus environment overrides. A missing file yields
    /// the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("RAILSIM").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Simulation context for `mode` using these settings.
    pub fn context(&self, mode: Mode) -> SimulationContext {
        SimulationContext {
            mode,
            grid: self.grid,
            default_max_speed: self.default_max_speed,
        }
    }

    fn check(&self) -> Result<()> {
        if !(self.default_max_speed.is_finite() && self.default_max_speed >= 0.0) {
            anyhow::bail!(
                "default_max_speed must be a non-negative number, got {}",
                self.default_max_speed
            );
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            anyhow::bail!("time_step must be positive, got {}", self.time_step);
        }
        if self.tick_ms == 0 {
            anyhow::bail!("tick_ms must be positive");
        }
        Ok(())
    }
}

/// Location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Create the configuration file with default values unless it exists.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

/// Write the default configuration to `path` unless a file is already there.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote default configuration to {}", path.display());
    Ok(())
}
