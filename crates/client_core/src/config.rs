use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use directions::google::GOOGLE_MAPS_BASE_URL;
use tracing::warn;
use url::Url;

use crate::session::{RetryPolicy, SESSION_CHECK_ATTEMPTS, SESSION_CHECK_RETRY_DELAY};
use crate::transport::DEFAULT_REQUEST_TIMEOUT;

pub const SETTINGS_FILE: &str = "sendit.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub directions_base_url: String,
    pub directions_api_key: Option<String>,
    pub session_check_attempts: u32,
    pub session_check_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5555".into(),
            directions_base_url: GOOGLE_MAPS_BASE_URL.into(),
            directions_api_key: None,
            session_check_attempts: SESSION_CHECK_ATTEMPTS,
            session_check_delay_ms: SESSION_CHECK_RETRY_DELAY.as_millis() as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.session_check_attempts.max(1),
            delay: Duration::from_millis(self.session_check_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults, then `sendit.toml` in the working directory, then the environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match raw.parse::<toml::Table>() {
            Ok(table) => apply_file_overrides(&mut settings, &scalar_values(&table)),
            Err(err) => warn!(path = %path.display(), error = %err, "config: ignoring unreadable settings file"),
        }
    }

    apply_env_overrides(&mut settings, env);

    settings.backend_url = normalize_backend_url(&settings.backend_url)?;
    settings.directions_base_url = normalize_backend_url(&settings.directions_base_url)
        .context("invalid directions base url")?;
    Ok(settings)
}

/// Flattens the top-level string and integer keys of a settings table.
fn scalar_values(table: &toml::Table) -> HashMap<String, String> {
    table
        .iter()
        .filter_map(|(key, value)| match value {
            toml::Value::String(s) => Some((key.clone(), s.clone())),
            toml::Value::Integer(i) => Some((key.clone(), i.to_string())),
            other => {
                warn!(key = %key, kind = other.type_str(), "config: ignoring non-scalar setting");
                None
            }
        })
        .collect()
}

pub fn apply_file_overrides(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("backend_url") {
        settings.backend_url = v.clone();
    }
    if let Some(v) = file_cfg.get("directions_base_url") {
        settings.directions_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("directions_api_key") {
        settings.directions_api_key = Some(v.clone());
    }
    if let Some(parsed) = file_cfg
        .get("session_check_attempts")
        .and_then(|v| v.parse().ok())
    {
        settings.session_check_attempts = parsed;
    }
    if let Some(parsed) = file_cfg
        .get("session_check_delay_ms")
        .and_then(|v| v.parse().ok())
    {
        settings.session_check_delay_ms = parsed;
    }
    if let Some(parsed) = file_cfg
        .get("request_timeout_secs")
        .and_then(|v| v.parse().ok())
    {
        settings.request_timeout_secs = parsed;
    }
}

fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    // Later names win.
    let var = |names: &[&str]| names.iter().rev().find_map(|name| env(*name));

    if let Some(v) = var(&["SENDIT_BACKEND_URL", "APP__BACKEND_URL"]) {
        settings.backend_url = v;
    }
    if let Some(v) = var(&["SENDIT_DIRECTIONS_BASE_URL", "APP__DIRECTIONS_BASE_URL"]) {
        settings.directions_base_url = v;
    }
    if let Some(v) = var(&["GOOGLE_MAPS_API_KEY", "SENDIT_DIRECTIONS_API_KEY", "APP__DIRECTIONS_API_KEY"]) {
        settings.directions_api_key = Some(v).filter(|key| !key.trim().is_empty());
    }
    if let Some(parsed) = var(&["APP__SESSION_CHECK_ATTEMPTS"]).and_then(|v| v.parse().ok()) {
        settings.session_check_attempts = parsed;
    }
    if let Some(parsed) = var(&["APP__SESSION_CHECK_DELAY_MS"]).and_then(|v| v.parse().ok()) {
        settings.session_check_delay_ms = parsed;
    }
    if let Some(parsed) = var(&["APP__REQUEST_TIMEOUT_SECS"]).and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = parsed;
    }
}

/// Accepts `host:port` shorthands, defaults to http and strips trailing slashes.
pub fn normalize_backend_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("backend url is empty");
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let parsed = Url::parse(&candidate).with_context(|| format!("invalid url '{raw}'"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => bail!("unsupported url scheme '{other}' in '{raw}'"),
    }
    if parsed.host_str().is_none() {
        bail!("url '{raw}' has no host");
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
