//! Application configuration for the `warden` binary.
//!
//! Loaded from `<config_dir>/warden/config.toml` (or `--config`), with
//! `WARDEN_DEFAULT_ROLES` and `WARDEN_LOG_LEVEL` applied on top.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_acl::{Manager, ManagerOptions};
use warden_api::ServerConfig;
use warden_auth::{DEFAULT_USER_HEADER, HeaderIdentity};
use warden_core::ConfigManager;
use warden_storage::JsonFileStorage;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Roles every user holds implicitly.
    pub default_roles: Vec<String>,
    /// Per-rule time limit in milliseconds; 0 disables it.
    pub rule_timeout_ms: u64,
    /// JSON file locations.
    pub storage: StorageConfig,
    /// Introspection server.
    pub server: ServerSection,
    /// Log output.
    pub logging: LoggingConfig,
}

/// The three JSON files of the file backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Items file.
    pub item_file: PathBuf,
    /// Assignments file.
    pub assignment_file: PathBuf,
    /// Rules file.
    pub rule_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = dirs::data_dir()
            .map(|d| d.join("warden"))
            .unwrap_or_else(|| PathBuf::from("rbac"));
        Self {
            item_file: dir.join("items.json"),
            assignment_file: dir.join("assignments.json"),
            rule_file: dir.join("rules.json"),
        }
    }
}

/// `[server]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Route path.
    pub path: String,
    /// Header carrying the caller's username.
    pub user_header: String,
    /// Usernames treated as superusers.
    pub superusers: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            path: server.path,
            user_header: DEFAULT_USER_HEADER.to_string(),
            superusers: Vec::new(),
        }
    }
}

/// `[logging]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `warden_acl=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ConfigManager for WardenConfig {
    fn project_name() -> &'static str {
        "warden"
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

impl WardenConfig {
    /// Applies overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(roles) = var("WARDEN_DEFAULT_ROLES") {
            self.default_roles = roles
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(level) = var("WARDEN_LOG_LEVEL").filter(|l| !l.is_empty()) {
            self.logging.level = level;
        }
    }

    /// Engine options.
    pub fn manager_options(&self) -> ManagerOptions {
        let options = ManagerOptions::default().with_default_roles(self.default_roles.clone());
        if self.rule_timeout_ms > 0 {
            options.with_rule_timeout(Duration::from_millis(self.rule_timeout_ms))
        } else {
            options
        }
    }

    /// File-backed storage at the configured paths.
    pub fn storage(&self) -> JsonFileStorage {
        JsonFileStorage::new(
            &self.storage.item_file,
            &self.storage.assignment_file,
            &self.storage.rule_file,
        )
    }

    /// A manager over the configured storage.
    pub fn manager(&self) -> Manager {
        Manager::new(Arc::new(self.storage()), self.manager_options())
    }

    /// Introspection server settings.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            path: self.server.path.clone(),
        }
    }

    /// Caller resolution for the server.
    pub fn identity(&self) -> HeaderIdentity {
        HeaderIdentity::new(&self.server.user_header).with_superusers(self.server.superusers.clone())
    }
}
