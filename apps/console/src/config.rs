use std::{fs, path::Path};

use anyhow::Context;
use client_core::Locale;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub anon_key: String,
    pub site_origin: String,
    pub home_path: String,
    pub todos_table: String,
    pub locale: Locale,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:54321".into(),
            anon_key: String::new(),
            site_origin: "http://localhost:3000".into(),
            home_path: "/".into(),
            todos_table: "todos".into(),
            locale: Locale::En,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    anon_key: Option<String>,
    site_origin: Option<String>,
    home_path: Option<String>,
    todos_table: Option<String>,
    locale: Option<String>,
}

/// Defaults, then the TOML file (if present), then environment variables.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => {
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        Err(err) if config_path.is_some() => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.anon_key {
        settings.anon_key = v;
    }
    if let Some(v) = file_cfg.site_origin {
        settings.site_origin = v;
    }
    if let Some(v) = file_cfg.home_path {
        settings.home_path = v;
    }
    if let Some(v) = file_cfg.todos_table {
        settings.todos_table = v;
    }
    if let Some(v) = file_cfg.locale {
        settings.locale = v.parse().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SUPABASE_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = lookup("SUPABASE_ANON_KEY") {
        settings.anon_key = v;
    }
    if let Some(v) = lookup("APP__ANON_KEY") {
        settings.anon_key = v;
    }

    if let Some(v) = lookup("APP__SITE_ORIGIN") {
        settings.site_origin = v;
    }
    if let Some(v) = lookup("APP__HOME_PATH") {
        settings.home_path = v;
    }
    if let Some(v) = lookup("APP__TODOS_TABLE") {
        settings.todos_table = v;
    }

    if let Some(v) = lookup("APP__LOCALE") {
        match v.parse() {
            Ok(locale) => settings.locale = locale,
            Err(err) => tracing::warn!(error = %err, "ignoring APP__LOCALE"),
        }
    }
}

pub fn validate(settings: &Settings) -> anyhow::Result<()> {
    Url::parse(&settings.backend_url)
        .with_context(|| format!("invalid backend url '{}'", settings.backend_url))?;
    Url::parse(&settings.site_origin)
        .with_context(|| format!("invalid site origin '{}'", settings.site_origin))?;
    if settings.todos_table.trim().is_empty() {
        anyhow::bail!("todos table name must not be empty");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
