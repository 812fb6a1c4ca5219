//! Configuration for the CLI and embedders
//!
//! Values are layered, lowest priority first: built-in defaults, the JSON
//! file at `~/.config/pubvar/config.json` (or `$PUBVAR_CONFIG`), then
//! `PUBVAR_*` environment variables. The CLI applies its flags on top.

use crate::model::Controller;
use crate::store::CreateOpts;
use crate::tree::RepairPolicy;
use crate::variable::{VariableOptions, VariableParams};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_PATH: &str = "variables.pubvar";
pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const DEFAULT_MAX_FRAGMENTS: u64 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the file store
    pub store_path: PathBuf,
    /// Identity used as caller and as controller of new variables
    pub controller: Option<String>,
    /// Tree depth for new variables
    pub max_depth: u32,
    /// Versions per leaf / fanout per internal fragment for new variables
    pub max_fragments: u64,
    /// Rebuild empty fragments met on the write path instead of failing
    pub repair_dangling: bool,
    /// Pin documents created through this config
    pub pin: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            controller: None,
            max_depth: DEFAULT_MAX_DEPTH,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            repair_dangling: true,
            pin: false,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("PUBVAR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(dir.join("pubvar").join("config.json"))
    }

    /// Defaults, then the config file if present, then the environment
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.with_env_from(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay `PUBVAR_*` variables read through `lookup`
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup("PUBVAR_STORE") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(controller) = lookup("PUBVAR_CONTROLLER") {
            self.controller = Some(controller);
        }
        if let Some(depth) = lookup("PUBVAR_MAX_DEPTH") {
            self.max_depth = depth
                .parse()
                .map_err(|_| Error::Config(format!("PUBVAR_MAX_DEPTH is not a number: {}", depth)))?;
        }
        if let Some(fragments) = lookup("PUBVAR_MAX_FRAGMENTS") {
            self.max_fragments = fragments.parse().map_err(|_| {
                Error::Config(format!("PUBVAR_MAX_FRAGMENTS is not a number: {}", fragments))
            })?;
        }
        Ok(self)
    }

    /// The configured identity, required for anything that writes
    pub fn controller(&self) -> Result<Controller> {
        self.controller
            .as_deref()
            .map(Controller::new)
            .ok_or_else(|| Error::Config("No controller identity configured (set PUBVAR_CONTROLLER or --controller)".into()))
    }

    /// Construction options for variables owned by the configured identity
    pub fn variable_options(&self) -> Result<VariableOptions> {
        let create = CreateOpts {
            pin: self.pin,
            ..CreateOpts::local()
        };
        let repair = if self.repair_dangling {
            RepairPolicy::Materialize
        } else {
            RepairPolicy::Strict
        };
        Ok(VariableOptions::new(VariableParams::new(
            self.controller()?,
            self.max_depth,
            self.max_fragments,
        ))
        .with_create(create)
        .with_repair(repair))
    }
}
