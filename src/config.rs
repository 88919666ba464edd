//! Configuration loader and validator for the DiaCare admin tools.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::engine::Thresholds;

/// Environment variable that overrides `api.token` when set.
pub const TOKEN_ENV: &str = "DIACARE_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub api: Api,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub export_dir: String,
    pub page_size: u32,
    pub progress: Progress,
}

/// Cosmetic progress ticker used while a recommendation is being generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub tick_ms: u64,
    pub step: u8,
    pub cap: u8,
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.export_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.export_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.export_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `DIACARE_API_TOKEN` replaces `api.token` when present.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            cfg.api.token = token;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.export_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.export_dir must be non-empty"));
    }
    if cfg.app.page_size == 0 || cfg.app.page_size > 500 {
        return Err(ConfigError::Invalid("app.page_size must be within 1..=500"));
    }
    if cfg.app.progress.tick_ms == 0 {
        return Err(ConfigError::Invalid("app.progress.tick_ms must be > 0"));
    }
    if cfg.app.progress.step == 0 {
        return Err(ConfigError::Invalid("app.progress.step must be > 0"));
    }
    if cfg.app.progress.cap >= 100 {
        return Err(ConfigError::Invalid("app.progress.cap must be below 100"));
    }

    let base = cfg.api.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    match reqwest::Url::parse(base) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => return Err(ConfigError::Invalid("api.base_url must be an http(s) URL")),
    }
    if cfg.api.token.trim().is_empty() {
        return Err(ConfigError::Invalid("api.token must be non-empty"));
    }
    if cfg.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("api.timeout_seconds must be > 0"));
    }

    let t = &cfg.thresholds;
    if t.prediabetes_a1c >= t.high_risk_a1c {
        return Err(ConfigError::Invalid(
            "thresholds.prediabetes_a1c must be below thresholds.high_risk_a1c",
        ));
    }
    if t.stable_in_range >= t.improving_in_range {
        return Err(ConfigError::Invalid(
            "thresholds.stable_in_range must be below thresholds.improving_in_range",
        ));
    }
    if t.improving_in_range > 100.0 || t.stable_in_range < 0.0 {
        return Err(ConfigError::Invalid("thresholds in-range values must be within 0..=100"));
    }

    Ok(())
}

/// Returns the reference YAML content.
pub fn example() -> &'static str {
    r#"app:
  export_dir: "./exports"
  page_size: 50
  progress:
    tick_ms: 500
    step: 10
    cap: 90

api:
  base_url: "https://diacare.example.com/api/"
  token: "YOUR_ADMIN_API_TOKEN"
  timeout_seconds: 60

# Clinical cut-offs used by the patient filters and analytics bands.
thresholds:
  high_risk_a1c: 6.5
  prediabetes_a1c: 5.7
  improving_in_range: 70
  stable_in_range: 50
"#
}
