//! Three-file JSON storage backend.
//!
//! ```text
//! items.json        { "admin": { "type": "role", "name": "admin", "children": ["readPost"] },
//!                     "readPost": { "type": "permission", "name": "readPost", "children": [],
//!                                   "parents": ["admin"] }, ... }
//! assignments.json  { "alice": ["admin"], ... }
//! rules.json        { "isAuthor": { "name": "isAuthor", "data": { "typeName": "AuthorRule", "rule": "{}" } } }
//! ```
//!
//! Missing or empty files read as empty sections. Items keep their file
//! order, and `parents` restores the order edges were added in. Children
//! naming unknown items are dropped on load.
//!
//! The document is cached after the first read; each mutation is applied to
//! a copy, every affected file is staged next to its target, the staged
//! files are renamed into place, and the copy then replaces the cache. A
//! failed stage leaves every file untouched. Renames are atomic one file at
//! a time only, so a crash between two renames can still split a mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use warden_core::{
    Assignment, AssignmentRecords, AuthData, ClearScope, Error, Item, ItemKind, ItemRecords,
    Result, RuleDefinition, RuleRecords, Storage,
};

/// Default file names used by [`JsonFileStorage::in_dir`].
pub const ITEM_FILE: &str = "items.json";
/// Default assignments file name.
pub const ASSIGNMENT_FILE: &str = "assignments.json";
/// Default rules file name.
pub const RULE_FILE: &str = "rules.json";

/// Which files a mutation rewrites.
#[derive(Clone, Copy, Debug, Default)]
struct Sections {
    items: bool,
    assignments: bool,
    rules: bool,
}

impl Sections {
    const ITEMS: Self = Self {
        items: true,
        assignments: false,
        rules: false,
    };
    const ASSIGNMENTS: Self = Self {
        items: false,
        assignments: true,
        rules: false,
    };
    const RULES: Self = Self {
        items: false,
        assignments: false,
        rules: true,
    };
    const ITEMS_AND_ASSIGNMENTS: Self = Self {
        items: true,
        assignments: true,
        rules: false,
    };
    const ITEMS_AND_RULES: Self = Self {
        items: true,
        assignments: false,
        rules: true,
    };
    const ALL: Self = Self {
        items: true,
        assignments: true,
        rules: true,
    };

    fn for_clear(scope: ClearScope) -> Self {
        match scope {
            ClearScope::All => Self::ALL,
            ClearScope::Roles | ClearScope::Permissions => Self::ITEMS_AND_ASSIGNMENTS,
            ClearScope::Rules => Self::ITEMS_AND_RULES,
            ClearScope::Assignments => Self::ASSIGNMENTS,
        }
    }
}

/// Persists items, assignments, and rules as three JSON files.
#[derive(Debug)]
pub struct JsonFileStorage {
    item_file: PathBuf,
    assignment_file: PathBuf,
    rule_file: PathBuf,
    cache: Mutex<Option<AuthData>>,
}

impl JsonFileStorage {
    /// Uses the given file paths.
    pub fn new(
        item_file: impl Into<PathBuf>,
        assignment_file: impl Into<PathBuf>,
        rule_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_file: item_file.into(),
            assignment_file: assignment_file.into(),
            rule_file: rule_file.into(),
            cache: Mutex::new(None),
        }
    }

    /// Uses `items.json`, `assignments.json`, and `rules.json` under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(ITEM_FILE),
            dir.join(ASSIGNMENT_FILE),
            dir.join(RULE_FILE),
        )
    }

    /// Items file path.
    pub fn item_file(&self) -> &Path {
        &self.item_file
    }

    /// Assignments file path.
    pub fn assignment_file(&self) -> &Path {
        &self.assignment_file
    }

    /// Rules file path.
    pub fn rule_file(&self) -> &Path {
        &self.rule_file
    }

    async fn read_files(&self) -> Result<AuthData> {
        let items: ItemRecords = read_json(&self.item_file).await?;
        let assignments: AssignmentRecords = read_json(&self.assignment_file).await?;
        let rules: RuleRecords = read_json(&self.rule_file).await?;
        let data = AuthData::from_records(items, rules, assignments)?;
        log::debug!(
            "Read {} items and {} rules from {}",
            data.catalog.len(),
            data.rules.len(),
            self.item_file.display()
        );
        Ok(data)
    }

    async fn write_files(&self, data: &AuthData, sections: Sections) -> Result<()> {
        let mut pending: Vec<(&Path, String)> = Vec::new();
        if sections.items {
            pending.push((&self.item_file, to_json(&data.item_records())?));
        }
        if sections.assignments {
            pending.push((&self.assignment_file, to_json(&data.assignment_records())?));
        }
        if sections.rules {
            pending.push((&self.rule_file, to_json(&data.rule_records()?)?));
        }

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(pending.len());
        for (path, json) in &pending {
            match stage(path, json).await {
                Ok(tmp) => staged.push((tmp, *path)),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }

        for (tmp, path) in &staged {
            tokio::fs::rename(tmp, path)
                .await
                .map_err(|e| Error::io_with_path(e, path))?;
        }
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&AuthData) -> T) -> Result<T> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_files().await?);
        }
        match cache.as_ref() {
            Some(data) => Ok(f(data)),
            None => Err(Error::storage("document cache unavailable")),
        }
    }

    async fn mutate<T>(
        &self,
        sections: Sections,
        f: impl FnOnce(&mut AuthData) -> Result<T>,
    ) -> Result<T> {
        let mut cache = self.cache.lock().await;
        let mut next = match cache.as_ref() {
            Some(data) => data.clone(),
            None => self.read_files().await?,
        };
        let out = f(&mut next)?;
        self.write_files(&next, sections).await?;
        *cache = Some(next);
        Ok(out)
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            Error::storage_with_source(format!("Failed to parse {}", path.display()), e)
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{} does not exist; starting empty", path.display());
            Ok(T::default())
        }
        Err(e) => Err(Error::io_with_path(e, path)),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Where `path` is staged before the rename, e.g. `.items.json.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

async fn stage(path: &Path, json: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }
    }
    let tmp = staging_path(path);
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::io_with_path(e, &tmp))?;
    Ok(tmp)
}

async fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            log::warn!("Could not remove staged file {}: {e}", tmp.display());
        }
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self) -> Result<AuthData> {
        let data = self.read_files().await?;
        *self.cache.lock().await = Some(data.clone());
        log::info!(
            "Loaded authorization files: {}, {}, {}",
            self.item_file.display(),
            self.assignment_file.display(),
            self.rule_file.display()
        );
        Ok(data)
    }

    async fn get_item(&self, name: &str) -> Result<Option<Item>> {
        self.read(|d| d.catalog.get(name).cloned()).await
    }

    async fn get_items(&self, kind: ItemKind) -> Result<Vec<Item>> {
        self.read(|d| d.catalog.items_of_kind(kind).cloned().collect())
            .await
    }

    async fn add_item(&self, item: &Item) -> Result<()> {
        self.mutate(Sections::ITEMS, |d| d.add_item(item.clone()))
            .await
    }

    async fn update_item(&self, name: &str, item: &Item) -> Result<()> {
        self.mutate(Sections::ITEMS_AND_ASSIGNMENTS, |d| {
            d.update_item(name, item.clone())
        })
        .await
    }

    async fn remove_item(&self, name: &str) -> Result<()> {
        self.mutate(Sections::ITEMS_AND_ASSIGNMENTS, |d| {
            d.remove_item(name);
            Ok(())
        })
        .await
    }

    async fn add_rule(&self, rule: &RuleDefinition) -> Result<()> {
        self.mutate(Sections::RULES, |d| d.add_rule(rule.clone()))
            .await
    }

    async fn update_rule(&self, name: &str, rule: &RuleDefinition) -> Result<()> {
        self.mutate(Sections::ITEMS_AND_RULES, |d| {
            d.update_rule(name, rule.clone())
        })
        .await
    }

    async fn remove_rule(&self, name: &str) -> Result<()> {
        self.mutate(Sections::ITEMS_AND_RULES, |d| {
            d.remove_rule(name);
            Ok(())
        })
        .await
    }

    async fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(Sections::ITEMS, |d| d.add_child(parent, child).map(drop))
            .await
    }

    async fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(Sections::ITEMS, |d| {
            d.remove_child(parent, child);
            Ok(())
        })
        .await
    }

    async fn remove_children(&self, parent: &str) -> Result<()> {
        self.mutate(Sections::ITEMS, |d| {
            d.remove_children(parent);
            Ok(())
        })
        .await
    }

    async fn get_assignments(&self, username: &str) -> Result<BTreeMap<String, Assignment>> {
        self.read(|d| d.assignments.assignments_of(username)).await
    }

    async fn assign(&self, assignment: &Assignment) -> Result<()> {
        self.mutate(Sections::ASSIGNMENTS, |d| {
            d.assign(&assignment.username, &assignment.item_name)
                .map(drop)
        })
        .await
    }

    async fn revoke(&self, username: &str, item_name: &str) -> Result<()> {
        self.mutate(Sections::ASSIGNMENTS, |d| {
            d.assignments.revoke(username, item_name);
            Ok(())
        })
        .await
    }

    async fn revoke_all(&self, username: &str) -> Result<()> {
        self.mutate(Sections::ASSIGNMENTS, |d| {
            d.assignments.revoke_all(username);
            Ok(())
        })
        .await
    }

    async fn get_usernames_by_item(&self, item_name: &str) -> Result<Vec<String>> {
        self.read(|d| d.assignments.usernames_granted(item_name))
            .await
    }

    async fn clear(&self, scope: ClearScope) -> Result<()> {
        self.mutate(Sections::for_clear(scope), |d| {
            d.clear(scope);
            Ok(())
        })
        .await
    }
}
