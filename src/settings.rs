// src/settings.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{CONFIG_DIR_NAME, DEFAULT_PREFIX, DEFAULT_SUCCESS_REACTION, SETTINGS_FILENAME};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not expand path '{path}': {reason}")]
    Expand { path: String, reason: String },
}

/// When the cooldown of an invocation is written.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// After the command ran. Two concurrent invocations by one user may both pass the
    /// cooldown check.
    #[default]
    AfterRun,
    /// Reserved atomically once the constraints pass, and released again if the invocation
    /// does not complete.
    Reserve,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OptimizerSettings {
    pub enabled: bool,
    /// Commands unused for this long are released.
    pub window_secs: u64,
    /// How often the optimizer sweeps.
    pub interval_secs: u64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: 1800,
            interval_secs: 300,
        }
    }
}

/// Runtime configuration of the framework.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub prefixes: Vec<String>,
    /// Delete the triggering message after a successful execution.
    pub delete_invocation: bool,
    /// React to the triggering message after a successful execution.
    pub react_on_success: bool,
    pub success_reaction: String,
    pub cooldown_policy: CooldownPolicy,
    /// Named groups of user ids, referenced by `group:<name>` specific entries.
    pub groups: BTreeMap<String, Vec<String>>,
    /// Directory scanned for command manifests. Supports `~` and environment variables.
    pub commands_dir: Option<String>,
    pub optimizer: OptimizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefixes: vec![DEFAULT_PREFIX.to_string()],
            delete_invocation: false,
            react_on_success: false,
            success_reaction: DEFAULT_SUCCESS_REACTION.to_string(),
            cooldown_policy: CooldownPolicy::AfterRun,
            groups: BTreeMap::new(),
            commands_dir: None,
            optimizer: OptimizerSettings::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        log::debug!("Loaded settings from '{}': {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Reads settings from `path`, writing the defaults there first if the file is missing.
    pub fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            log::info!("No settings at '{}'. Writing defaults.", path.display());
            let settings = Settings::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&settings)?)?;
            return Ok(settings);
        }
        Self::load(path)
    }

    /// `<config dir>/herald/settings.toml`.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::ConfigDirNotFound)?;
        Ok(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILENAME))
    }

    /// Expands `~` and environment variables in a configured path.
    pub fn expand_path(raw: &str) -> Result<PathBuf, SettingsError> {
        let expanded = shellexpand::full(raw).map_err(|e| SettingsError::Expand {
            path: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// The expanded manifest directory, if one is configured.
    pub fn commands_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.commands_dir
            .as_deref()
            .map(Self::expand_path)
            .transpose()
    }

    /// User ids in group `name`; empty for unknown groups.
    pub fn group_members(&self, name: &str) -> &[String] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
