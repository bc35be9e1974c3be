//! Configuration for pulsemon dashboards.
//!
//! TOML profiles layered with `PULSEMON_` environment variables, basic-auth
//! credential resolution (env + keyring + plaintext), and translation to
//! the runtime types of `pulsemon-api` and `pulsemon-core`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use pulsemon_api::{BasicAuth, Endpoints, TlsMode, TransportConfig};
use pulsemon_core::{CoreError, DashboardConfig, PreferenceOptions};

const KEYRING_SERVICE: &str = "pulsemon";
const PASSWORD_ENV: &str = "PULSEMON_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error(transparent)]
    Core(#[from] CoreError),

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
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named dashboard profiles.
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

/// Values every profile inherits unless it overrides them.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub insecure: bool,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub refresh_interval_ms: u64,
    pub auto_refresh: bool,
    pub page_size: u32,
    pub theme: PreferenceOptions,
}

impl Default for Defaults {
    fn default() -> Self {
        let dashboard = DashboardConfig::default();
        Self {
            insecure: false,
            timeout: 30,
            refresh_interval_ms: dashboard.refresh_interval_ms,
            auto_refresh: dashboard.auto_refresh,
            page_size: dashboard.page_size,
            theme: PreferenceOptions::default(),
        }
    }
}

/// A named dashboard profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Dashboard mount URL (e.g., "http://localhost:8000/monitor").
    pub url: String,

    /// Basic-auth username, if the dashboard is behind a login.
    pub username: Option<String>,

    /// Basic-auth password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,
    pub timeout: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
    pub auto_refresh: Option<bool>,
    pub page_size: Option<u32>,

    /// Endpoint paths, when the API is not at the usual `/api/...`.
    pub endpoints: Option<Endpoints>,

    /// Replaces `defaults.theme` entirely when present.
    pub theme: Option<PreferenceOptions>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "pulsemon", "pulsemon")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pulsemon");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the file-backed preference store.
pub fn preference_store_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("preferences.json"),
        |dirs| dirs.data_dir().join("preferences.json"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, layered over defaults and under `PULSEMON_`
/// environment variables (`__` separates nested keys, e.g.
/// `PULSEMON_DEFAULTS__PAGE_SIZE=50`). A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PULSEMON_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "configuration saved");
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve basic-auth credentials for a profile.
///
/// `Ok(None)` when the profile has no username. Otherwise the password is
/// taken from the first of: the profile's `password_env` variable,
/// `PULSEMON_PASSWORD`, the system keyring (`pulsemon` / `{profile}/password`),
/// plaintext `password`.
pub fn resolve_basic_auth(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<BasicAuth>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };

    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(Some(BasicAuth::new(username, SecretString::from(pw))));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(Some(BasicAuth::new(username, SecretString::from(pw))));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Some(BasicAuth::new(username, SecretString::from(pw))));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Some(BasicAuth::new(username, SecretString::from(pw.clone()))));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation to runtime types ────────────────────────────────────

/// Everything needed to construct a client, controller, and preference
/// manager for one profile.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub name: String,
    pub base_url: Url,
    pub transport: TransportConfig,
    pub dashboard: DashboardConfig,
    pub preferences: PreferenceOptions,
}

/// Build the polling configuration from a profile over `defaults`.
pub fn profile_to_dashboard_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<DashboardConfig, ConfigError> {
    let config = DashboardConfig {
        refresh_interval_ms: profile
            .refresh_interval_ms
            .unwrap_or(defaults.refresh_interval_ms),
        auto_refresh: profile.auto_refresh.unwrap_or(defaults.auto_refresh),
        endpoints: profile.endpoints.clone().unwrap_or_default(),
        page_size: profile.page_size.unwrap_or(defaults.page_size),
    };
    config.validate()?;
    Ok(config)
}

/// Build transport settings (TLS, timeout, credentials) for a profile.
pub fn profile_to_transport(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<TransportConfig, ConfigError> {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        basic_auth: resolve_basic_auth(profile, profile_name)?,
    })
}

/// Resolve the named profile, or the default one when `name` is `None`.
pub fn resolve_profile(config: &Config, name: Option<&str>) -> Result<ResolvedProfile, ConfigError> {
    let name = name
        .or(config.default_profile.as_deref())
        .unwrap_or("default");
    let profile = config
        .profiles
        .get(name)
        .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })?;

    let base_url: Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    Ok(ResolvedProfile {
        name: name.to_owned(),
        base_url,
        transport: profile_to_transport(profile, name, &config.defaults)?,
        dashboard: profile_to_dashboard_config(profile, &config.defaults)?,
        preferences: profile
            .theme
            .clone()
            .unwrap_or_else(|| config.defaults.theme.clone()),
    })
}
