use std::{fs, path::Path};

use anyhow::Context;
use signal_core::{config, CycleTiming, IntersectionConfig};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "intersection.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub green_secs: u32,
    pub second_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            green_secs: config::DEFAULT_GREEN_SECONDS,
            second_ms: config::DEFAULT_SECOND_MILLIS,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn intersection_config(&self) -> IntersectionConfig {
        IntersectionConfig::default()
            .with_green_secs(self.green_secs)
            .with_timing(CycleTiming::from_millis(self.second_ms))
    }
}

/// Defaults, then the config file (if present), then the process environment.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table: toml::Table = toml::from_str(raw)?;
    if let Some(v) = table.get("green_seconds").and_then(value_as_string) {
        set_parsed(&mut settings.green_secs, "green_seconds", &v);
    }
    if let Some(v) = table.get("second_ms").and_then(value_as_string) {
        set_parsed(&mut settings.second_ms, "second_ms", &v);
    }
    if let Some(v) = table.get("log_filter").and_then(value_as_string) {
        settings.log_filter = v;
    }
    Ok(())
}

pub(crate) fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["INTERSECTION_GREEN_SECONDS", "APP__GREEN_SECONDS"] {
        if let Some(v) = lookup(key) {
            set_parsed(&mut settings.green_secs, key, &v);
        }
    }
    for key in ["INTERSECTION_SECOND_MS", "APP__SECOND_MS"] {
        if let Some(v) = lookup(key) {
            set_parsed(&mut settings.second_ms, key, &v);
        }
    }
    for key in ["INTERSECTION_LOG", "APP__LOG_FILTER"] {
        if let Some(v) = lookup(key) {
            settings.log_filter = v;
        }
    }
}

fn value_as_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "config: ignoring unparsable value"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
