//! Handlers for the `config` subcommands.
//!
//! Generic over [`ConfigManager`] and returning the text to print, so the
//! binary owns stdout and the handlers stay testable.

use std::path::PathBuf;

use warden_core::{ConfigManager, Error, Result};

use crate::cli::ConfigAction;
use crate::config::WardenConfig;

/// Runs a config subcommand against [`WardenConfig`].
pub fn handle_config_command(config_path: Option<&str>, action: &ConfigAction) -> Result<String> {
    match action {
        ConfigAction::Path => config_path_report::<WardenConfig>(config_path),
        ConfigAction::Get { key } => config_get::<WardenConfig>(config_path, key),
        ConfigAction::Init { file, force } => {
            let path = config_init::<WardenConfig>(file.as_deref().or(config_path), *force)?;
            Ok(format!("Config file created at {}", path.display()))
        }
        ConfigAction::Export { docker_env } => {
            let config = WardenConfig::load(config_path)?;
            config_export(&config, *docker_env)
        }
    }
}

/// The resolved config path, flagged if the file is missing.
pub fn config_path_report<C: ConfigManager>(config_path: Option<&str>) -> Result<String> {
    let path = C::resolve_config_path(config_path)
        .ok_or_else(|| Error::config("Could not determine config directory for this platform"))?;
    if path.exists() {
        Ok(path.display().to_string())
    } else {
        Ok(format!(
            "{} (missing; run `{} config init`)",
            path.display(),
            C::project_name()
        ))
    }
}

/// The value at a dotted key, e.g. `server.port`.
pub fn config_get<C: ConfigManager>(config_path: Option<&str>, key: &str) -> Result<String> {
    let config = C::load(config_path)?;
    let value = toml::Value::try_from(&config).map_err(|e| Error::config(e.to_string()))?;
    lookup(&value, key)
        .map(render)
        .ok_or_else(|| Error::config(format!("Key '{key}' not found in configuration")))
}

/// Writes the default config to `file` (or the default path). Refuses to
/// overwrite unless `force`.
pub fn config_init<C: ConfigManager>(file: Option<&str>, force: bool) -> Result<PathBuf> {
    let path = C::resolve_config_path(file)
        .ok_or_else(|| Error::config("Could not determine config directory"))?;

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }
    std::fs::write(&path, C::default().to_toml_string()?)
        .map_err(|e| Error::io_with_path(e, &path))?;
    Ok(path)
}

/// `KEY=value` lines, or `--env KEY=value` for docker.
pub fn config_export<C: ConfigManager>(config: &C, docker_env: bool) -> Result<String> {
    let prefix = if docker_env { "--env " } else { "" };
    Ok(config
        .to_env_vars()?
        .into_iter()
        .map(|(key, value)| format!("{prefix}{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn lookup<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}

fn render(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(","),
        toml::Value::Table(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
        }
        other => other.to_string(),
    }
}
