use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Ask the service to embed stop lists in ticket results
    #[serde(default = "default_true")]
    pub include_stops: bool,
    #[serde(default = "default_purpose_codes")]
    pub purpose_codes: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            include_stops: true,
            purpose_codes: default_purpose_codes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// File backend location; the platform data directory when unset
    pub path: Option<PathBuf>,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: None,
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThemeConfig {
    #[serde(default = "default_dark_from")]
    pub dark_from_hour: u32,
    #[serde(default = "default_dark_until")]
    pub dark_until_hour: u32,
    #[serde(default = "default_auto_check")]
    pub auto_check_seconds: u64,
    #[serde(default = "default_primary_color")]
    pub default_primary_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            dark_from_hour: default_dark_from(),
            dark_until_hour: default_dark_until(),
            auto_check_seconds: default_auto_check(),
            default_primary_color: default_primary_color(),
        }
    }
}

fn default_base_url() -> String { "http://localhost:8001/api".into() }
fn default_timeout() -> u64 { 10 }
fn default_true() -> bool { true }
fn default_purpose_codes() -> String { "ADULT".into() }
fn default_redis_url() -> String { "redis://127.0.0.1/".into() }
fn default_key_prefix() -> String { "railq".into() }
fn default_dark_from() -> u32 { 18 }
fn default_dark_until() -> u32 { 8 }
fn default_auto_check() -> u64 { 60 }
fn default_primary_color() -> String { "#409eff".into() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_with(None)
    }

    /// Same layering as [`Config::load`], with an extra file applied before the environment.
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = config::Config::builder()
            // Every key has a built-in default, so even "default" is optional
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(config::File::from(path));
        }

        // Eg.. `RAILQ__API__BASE_URL=http://host/api`
        let s = builder
            .add_source(
                config::Environment::with_prefix("RAILQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
