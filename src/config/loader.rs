//! Settings struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.layerconf.toml` in the working directory
//! 4. `~/.config/layerconf/config.toml` (global defaults)
//! 5. Built-in defaults

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CONFIG_DIR, CONFIG_FILENAME, DEFAULT_DELAY_MILLIS, DEFAULT_HTTP_TIMEOUT_SECS,
    ENV_DELAY_MILLIS, ENV_HTTP_TIMEOUT_SECS, ENV_IGNORE_DELETES, ENV_IGNORE_MISSING,
    ENV_INITIAL_DELAY_MILLIS,
};
use crate::env::Env;
use crate::policy::{AggregationParameters, PollingPolicy, parameter_map};

/// Errors during settings loading.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value `{value}` for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub polling: PollingSettings,
    pub sources: SourceSettings,
}

/// Refresh timing shared by every source the tool builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub initial_delay_millis: u64,
    pub delay_millis: u64,
    pub ignore_deletes: bool,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            initial_delay_millis: DEFAULT_DELAY_MILLIS,
            delay_millis: DEFAULT_DELAY_MILLIS,
            ignore_deletes: false,
        }
    }
}

/// How locations are found and fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Skip locations that cannot be resolved instead of failing.
    pub ignore_missing: bool,
    pub http_timeout_secs: u64,
    /// Directories searched, in order, for `classpath:` locations.
    pub resource_roots: Vec<PathBuf>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            ignore_missing: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            resource_roots: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings with proper layering.
    ///
    /// Reads the global file, the file in `work_dir`, then applies
    /// environment variable overrides. CLI flags are applied by the caller.
    pub fn load(work_dir: Option<&Path>, env: &Env) -> Result<Self, SettingsError> {
        Self::load_layers(Self::global_settings_path().as_deref(), work_dir, env)
    }

    fn load_layers(
        global_path: Option<&Path>,
        work_dir: Option<&Path>,
        env: &Env,
    ) -> Result<Self, SettingsError> {
        let mut settings = Settings::default();

        // Layer 4: global file
        if let Some(path) = global_path.filter(|p| p.exists()) {
            settings.merge(Self::load_file(path)?);
        }

        // Layer 3: local file
        if let Some(dir) = work_dir {
            let local_path = dir.join(CONFIG_FILENAME);
            if local_path.exists() {
                settings.merge(Self::load_file(&local_path)?);
            }
        }

        // Layer 2: environment variables
        settings.apply_env_vars(env)?;

        Ok(settings)
    }

    /// Load settings from a specific file. Relative resource roots are
    /// taken relative to the file's directory.
    fn load_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut settings: Settings =
            toml::from_str(&content).map_err(|e| SettingsError::ParseFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        if let Some(base) = path.parent() {
            for root in &mut settings.sources.resource_roots {
                if root.is_relative() {
                    *root = base.join(&*root);
                }
            }
        }
        Ok(settings)
    }

    fn global_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join("config.toml"))
    }

    /// Merge another layer into this one; only non-default values override.
    fn merge(&mut self, other: Settings) {
        let default_polling = PollingSettings::default();
        if other.polling.initial_delay_millis != default_polling.initial_delay_millis {
            self.polling.initial_delay_millis = other.polling.initial_delay_millis;
        }
        if other.polling.delay_millis != default_polling.delay_millis {
            self.polling.delay_millis = other.polling.delay_millis;
        }
        if other.polling.ignore_deletes {
            self.polling.ignore_deletes = true;
        }

        let default_sources = SourceSettings::default();
        if other.sources.ignore_missing {
            self.sources.ignore_missing = true;
        }
        if other.sources.http_timeout_secs != default_sources.http_timeout_secs {
            self.sources.http_timeout_secs = other.sources.http_timeout_secs;
        }
        if !other.sources.resource_roots.is_empty() {
            self.sources.resource_roots = other.sources.resource_roots;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) -> Result<(), SettingsError> {
        if let Some(millis) = env_u64(env, ENV_INITIAL_DELAY_MILLIS)? {
            self.polling.initial_delay_millis = millis;
        }
        if let Some(millis) = env_u64(env, ENV_DELAY_MILLIS)? {
            self.polling.delay_millis = millis;
        }
        if let Some(secs) = env_u64(env, ENV_HTTP_TIMEOUT_SECS)? {
            self.sources.http_timeout_secs = secs;
        }
        if let Some(on) = env_flag(env, ENV_IGNORE_DELETES)? {
            self.polling.ignore_deletes = on;
        }
        if let Some(on) = env_flag(env, ENV_IGNORE_MISSING)? {
            self.sources.ignore_missing = on;
        }
        Ok(())
    }

    pub fn policy(&self) -> PollingPolicy {
        PollingPolicy::from_millis(
            self.polling.initial_delay_millis,
            self.polling.delay_millis,
            self.polling.ignore_deletes,
        )
    }

    pub fn aggregation_parameters(&self) -> AggregationParameters {
        AggregationParameters {
            policy: self.policy(),
            ignore_missing: self.sources.ignore_missing,
        }
    }

    /// The string bundle accepted by mixed database/location builds.
    pub fn parameter_map(&self) -> HashMap<String, String> {
        parameter_map(
            self.polling.delay_millis,
            self.polling.initial_delay_millis,
            self.polling.ignore_deletes,
            self.sources.ignore_missing,
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.http_timeout_secs)
    }
}

fn env_u64(env: &Env, name: &str) -> Result<Option<u64>, SettingsError> {
    env.var(name)
        .map(|raw| {
            raw.parse::<u64>().map_err(|_| SettingsError::InvalidEnv {
                name: name.to_string(),
                value: raw,
            })
        })
        .transpose()
}

fn env_flag(env: &Env, name: &str) -> Result<Option<bool>, SettingsError> {
    env.flag(name).map_err(|value| SettingsError::InvalidEnv {
        name: name.to_string(),
        value,
    })
}
