//! Traits implemented outside this crate.
//!
//! - [`Storage`]: the persistence contract a backend satisfies
//! - [`ConfigManager`]: file-backed application configuration

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Assignment, AuthData, ClearScope, Error, Item, ItemKind, Result, RuleDefinition};

// ============================================================================
// Storage
// ============================================================================

/// Persistence backend for the authorization graph.
///
/// Every method is atomic at the granularity of a single call: a failed call
/// leaves the stored state unchanged. File backends that spread one call
/// over several files may only guarantee this up to a crash mid-commit.
/// Backends apply the same cascades as
/// [`AuthData`] (item removal drops edges and assignments, rule removal
/// ungates items, renames rewrite references).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads the full document.
    async fn load(&self) -> Result<AuthData>;

    /// Reads one item.
    async fn get_item(&self, name: &str) -> Result<Option<Item>>;

    /// Reads all items of a kind.
    async fn get_items(&self, kind: ItemKind) -> Result<Vec<Item>>;

    /// Persists a new item.
    async fn add_item(&self, item: &Item) -> Result<()>;

    /// Replaces (and possibly renames) an item.
    async fn update_item(&self, name: &str, item: &Item) -> Result<()>;

    /// Removes an item with its edges and assignments.
    async fn remove_item(&self, name: &str) -> Result<()>;

    /// Persists a new rule.
    async fn add_rule(&self, rule: &RuleDefinition) -> Result<()>;

    /// Replaces (and possibly renames) a rule.
    async fn update_rule(&self, name: &str, rule: &RuleDefinition) -> Result<()>;

    /// Removes a rule and ungates referencing items.
    async fn remove_rule(&self, name: &str) -> Result<()>;

    /// Persists a hierarchy edge.
    async fn add_child(&self, parent: &str, child: &str) -> Result<()>;

    /// Removes a hierarchy edge.
    async fn remove_child(&self, parent: &str, child: &str) -> Result<()>;

    /// Removes every edge below `parent`.
    async fn remove_children(&self, parent: &str) -> Result<()>;

    /// Reads a user's direct grants.
    async fn get_assignments(&self, username: &str) -> Result<BTreeMap<String, Assignment>>;

    /// Persists a grant.
    async fn assign(&self, assignment: &Assignment) -> Result<()>;

    /// Removes a grant.
    async fn revoke(&self, username: &str, item_name: &str) -> Result<()>;

    /// Removes every grant of a user.
    async fn revoke_all(&self, username: &str) -> Result<()>;

    /// Users directly granted `item_name`.
    async fn get_usernames_by_item(&self, item_name: &str) -> Result<Vec<String>>;

    /// Bulk removal.
    async fn clear(&self, scope: ClearScope) -> Result<()>;
}

// ============================================================================
// ConfigManager
// ============================================================================

/// File-backed configuration with environment overrides.
///
/// Implementors only name the project; path resolution, TOML encoding,
/// and env export come for free.
pub trait ConfigManager: Serialize + DeserializeOwned + Default {
    /// Project name used for the config directory and env prefix.
    fn project_name() -> &'static str;

    /// `<config_dir>/<project>/config.toml`, if the platform has a config dir.
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::project_name()).join("config.toml"))
    }

    /// Explicit path if given, else the default path.
    fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        explicit
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
    }

    /// Applies environment overrides after loading.
    fn apply_env_overrides(&mut self) {}

    /// Loads the config file (defaults if it does not exist), then applies
    /// environment overrides.
    fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(config_path) {
            Some(path) if path.exists() => {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(e, &path))?;
                toml::from_str(&content).map_err(|e| {
                    Error::config(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Pretty TOML.
    fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flattens the config into `PROJECT_SECTION_KEY=value` pairs.
    fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value = toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_env(&Self::project_name().to_uppercase(), &value, &mut vars);
        Ok(vars)
    }
}

fn flatten_env(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, inner) in table {
                let name = format!("{prefix}_{}", key.to_uppercase());
                flatten_env(&name, inner, out);
            }
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.push((prefix.to_string(), joined));
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        tags: Vec<String>,
        server: TestServer,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct TestServer {
        port: u16,
    }

    impl Default for TestServer {
        fn default() -> Self {
            Self { port: 8080 }
        }
    }

    impl ConfigManager for TestConfig {
        fn project_name() -> &'static str {
            "testproj"
        }
    }

    #[test]
    fn test_resolve_explicit_path() {
        let path = TestConfig::resolve_config_path(Some("/explicit/config.toml")).unwrap();
        assert_eq!(path, PathBuf::from("/explicit/config.toml"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = TestConfig::load(Some("/nonexistent/warden/config.toml")).unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "name = \"x\"\n[server]\nport = 9000\n").unwrap();
        let config = TestConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.name, "x");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "name = ").unwrap();
        let err = TestConfig::load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_to_env_vars() {
        let config = TestConfig {
            name: "n".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            server: TestServer { port: 1 },
        };
        let vars = config.to_env_vars().unwrap();
        assert!(vars.contains(&("TESTPROJ_NAME".to_string(), "n".to_string())));
        assert!(vars.contains(&("TESTPROJ_TAGS".to_string(), "a,b".to_string())));
        assert!(vars.contains(&("TESTPROJ_SERVER_PORT".to_string(), "1".to_string())));
    }
}
