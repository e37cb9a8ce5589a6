//! Render pipeline configuration
//!
//! Loads from `~/.config/ember/render.toml`, auto-generating the default
//! file on first run. The two damage-debugging switches can also be flipped
//! through environment variables (`EMBER_NO_DAMAGE_TRACK`,
//! `EMBER_DAMAGE_DEBUG`) so a session that already has a config file can
//! still enable them per run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Runtime switches for the per-output render pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Force a full-output repaint every frame instead of tracked damage
    pub no_damage_track: bool,
    /// Fill the backbuffer with yellow before drawing, so stale regions
    /// stand out
    pub damage_debug: bool,
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    Some(!matches!(value.as_str(), "" | "0" | "false"))
}

impl RenderConfig {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read render config file")?;
            let config: RenderConfig =
                toml::from_str(&content).context("Failed to parse render config file")?;
            info!("Render configuration loaded from {:?}", config_path);
            config
        } else {
            info!("Render config not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default render config: {}", e);
            }
            Self::default()
        };

        config.apply_env_overrides();
        debug!("Render config: {:?}", config);
        Ok(config)
    }

    /// Apply environment-variable overrides on top of the loaded file
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_flag("EMBER_NO_DAMAGE_TRACK") {
            self.no_damage_track = v;
        }
        if let Some(v) = env_flag("EMBER_DAMAGE_DEBUG") {
            self.damage_debug = v;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("ember");

        Ok(config_dir.join("render.toml"))
    }

    fn save_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default render config")?;
        fs::write(path, toml_string).context("Failed to write default render config")?;

        info!("Default render config written to {:?}", path);
        Ok(())
    }
}
