//! Shared configuration for Nimbus tools.
//!
//! TOML profiles, pairing-token resolution (env + keyring + plaintext),
//! and translation to `nimbus_api::ClientConfig` and
//! `nimbus_core::SyncConfig`. The CLI layers its flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use nimbus_api::{ClientConfig, DEFAULT_BASE_URL, RetryPolicy, TransportConfig};
use nimbus_core::{SyncConfig, SyncMode};

/// Keyring service name; entries are keyed `<profile>/pairing-token`.
pub const KEYRING_SERVICE: &str = "nimbus";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no pairing token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use when none is given explicitly.
    pub fn default_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Sync mode: "status" or "events".
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_tick_timeout_secs")]
    pub tick_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            mode: default_mode(),
            interval_secs: default_interval_secs(),
            tick_timeout_secs: default_tick_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_mode() -> String {
    "events".into()
}
fn default_interval_secs() -> u64 {
    30
}
fn default_tick_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}

/// A named account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API root; defaults to the production service.
    pub api_url: Option<String>,

    /// Pairing token (plaintext; prefer keyring or env var).
    pub pairing_token: Option<String>,

    /// Environment variable name containing the pairing token.
    pub pairing_token_env: Option<String>,

    /// Appliances to mirror; empty means every appliance on the account.
    #[serde(default)]
    pub serials: Vec<String>,

    /// Override sync mode.
    pub mode: Option<String>,

    /// Override sync interval.
    pub interval_secs: Option<u64>,

    /// Override tick deadline.
    pub tick_timeout_secs: Option<u64>,

    /// Override attempts per request.
    pub max_attempts: Option<u32>,

    /// Override request timeout.
    pub timeout: Option<u64>,

    /// Display offset for timestamps, e.g. "+10:00".
    pub utc_offset: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "nimbus", "nimbus").map_or_else(
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
    p.push("nimbus");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, layered over defaults and under
/// `NIMBUS_`-prefixed environment variables (`__` separates nesting,
/// e.g. `NIMBUS_DEFAULTS__INTERVAL_SECS`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NIMBUS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, falling back to defaults when it cannot be read.
///
/// A missing file is not an error. A file that exists but fails to
/// parse is logged at `warn` before the defaults are used.
pub fn load_config_or_default() -> Config {
    load_config_or_default_from(&config_path())
}

pub fn load_config_or_default_from(path: &Path) -> Config {
    load_config_from(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable config, using defaults");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/pairing-token"),
    )?)
}

/// Resolve the pairing token from the credential chain (no CLI flag step).
pub fn resolve_pairing_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    choose_pairing_token(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        || {
            keyring_entry(profile_name)
                .ok()
                .and_then(|entry| entry.get_password().ok())
        },
    )
}

/// The resolution order itself: profile's env var, then keyring, then
/// plaintext in the profile. Lookups are injected so the order can be
/// exercised without touching the process environment.
pub fn choose_pairing_token(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's pairing_token_env → env var lookup
    if let Some(token) = profile.pairing_token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(token));
    }

    // 2. System keyring
    if let Some(token) = keyring() {
        return Ok(SecretString::from(token));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.pairing_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a pairing token in the system keyring for `profile_name`.
pub fn store_pairing_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

// ── Translation to runtime configs ──────────────────────────────────

/// Parse the profile's API root, falling back to the production service.
pub fn api_url(profile: &Profile) -> Result<Url, ConfigError> {
    let raw = profile.api_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Parse a display offset such as `+10:00`, `-0330`, `UTC`, or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return Ok(Utc.fix());
    }
    trimmed.parse().map_err(|_| ConfigError::Validation {
        field: "utc_offset".into(),
        reason: format!("expected an offset like '+10:00', got '{raw}'"),
    })
}

/// Build a `ClientConfig` from a profile, resolving its pairing token
/// through the credential chain.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let pairing_token = resolve_pairing_token(profile, profile_name)?;
    client_config_with_token(profile, defaults, pairing_token)
}

/// Build a `ClientConfig` from a profile with an already-known token.
pub fn client_config_with_token(
    profile: &Profile,
    defaults: &Defaults,
    pairing_token: SecretString,
) -> Result<ClientConfig, ConfigError> {
    let base_url = api_url(profile)?;

    let max_attempts = profile.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(ConfigError::Validation {
            field: "max_attempts".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(ClientConfig {
        base_url,
        pairing_token,
        transport: TransportConfig {
            timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
            retry: RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
        },
    })
}

/// Build a `SyncConfig` from a profile.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let mode_str = profile.mode.as_deref().unwrap_or(&defaults.mode);
    let mode: SyncMode = mode_str.parse().map_err(|_| ConfigError::Validation {
        field: "mode".into(),
        reason: format!("expected 'status' or 'events', got '{mode_str}'"),
    })?;

    let display_offset = match profile.utc_offset.as_deref() {
        Some(raw) => parse_utc_offset(raw)?,
        None => Utc.fix(),
    };

    let config = SyncConfig {
        mode,
        interval: Duration::from_secs(profile.interval_secs.unwrap_or(defaults.interval_secs)),
        tick_timeout: Duration::from_secs(
            profile
                .tick_timeout_secs
                .unwrap_or(defaults.tick_timeout_secs),
        ),
        serials: profile.serials.clone(),
        display_offset,
    };
    config.validate().map_err(|e| ConfigError::Validation {
        field: "sync".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}
