//! Shared configuration for the apsim CLI.
//!
//! TOML profiles layered under `APSIM_` environment overrides, and
//! translation to `apsim_core::SimulatorConfig`. The CLI adds its
//! flag-aware wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use apsim_core::SimulatorConfig;
use apsim_core::config::{DEFAULT_ENDPOINT, DEFAULT_RECONNECT_DELAY};

/// Name of the profile used when nothing else is selected.
pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::from([(DEFAULT_PROFILE.to_owned(), Profile::default())]),
        }
    }
}

impl Config {
    /// The profile name in effect: the explicit choice, else
    /// `default_profile`, else `"default"`.
    pub fn active_profile_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profile_names().join(", "),
            })
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Settings every profile inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Telemetry period in milliseconds pushed on every connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u32>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            update_interval: None,
        }
    }
}

fn default_reconnect_delay_ms() -> u64 {
    u64::try_from(DEFAULT_RECONNECT_DELAY.as_millis()).unwrap_or(5000)
}

/// A named backend profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// WebSocket endpoint (e.g. "ws://localhost:8000/ws").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u32>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            reconnect_delay_ms: None,
            update_interval: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "apsim", "apsim").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("apsim");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (a missing file is fine), then `APSIM_*`
/// variables. Nested keys use a double underscore:
/// `APSIM_DEFAULTS__UPDATE_INTERVAL=500`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("APSIM_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Parse and check a WebSocket endpoint.
pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url: Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "endpoint".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{other}://'"),
        }),
    }
}

/// Build a `SimulatorConfig` from a profile and the shared defaults.
pub fn profile_to_simulator_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SimulatorConfig, ConfigError> {
    let endpoint = parse_endpoint(&profile.endpoint)?;

    let delay_ms = profile
        .reconnect_delay_ms
        .unwrap_or(defaults.reconnect_delay_ms);
    if delay_ms == 0 {
        return Err(ConfigError::Validation {
            field: "reconnect_delay_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let update_interval = profile.update_interval.or(defaults.update_interval);
    if update_interval == Some(0) {
        return Err(ConfigError::Validation {
            field: "update_interval".into(),
            reason: "must be greater than zero".into(),
        });
    }

    Ok(SimulatorConfig::new(endpoint)
        .with_reconnect_delay(Duration::from_millis(delay_ms))
        .with_update_interval(update_interval))
}

/// Pick the active profile and translate it. Returns the profile name
/// alongside the settings.
pub fn resolve(
    cfg: &Config,
    explicit_profile: Option<&str>,
) -> Result<(String, SimulatorConfig), ConfigError> {
    let name = cfg.active_profile_name(explicit_profile);
    let profile = cfg.profile(name)?;
    let sim = profile_to_simulator_config(profile, &cfg.defaults)?;
    Ok((name.to_owned(), sim))
}
