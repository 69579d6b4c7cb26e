//! In-process storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use warden_core::{
    Assignment, AuthData, ClearScope, Item, ItemKind, Result, RuleDefinition, Storage,
};

/// Keeps the whole document in memory.
///
/// Mutations run on a copy that replaces the document only on success, so a
/// rejected call leaves nothing behind.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<AuthData>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `data`.
    pub fn with_data(data: AuthData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    async fn read<T>(&self, f: impl FnOnce(&AuthData) -> T) -> T {
        let data = self.data.lock().await;
        f(&data)
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut AuthData) -> Result<T>) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let out = f(&mut next)?;
        *data = next;
        Ok(out)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<AuthData> {
        Ok(self.read(AuthData::clone).await)
    }

    async fn get_item(&self, name: &str) -> Result<Option<Item>> {
        Ok(self.read(|d| d.catalog.get(name).cloned()).await)
    }

    async fn get_items(&self, kind: ItemKind) -> Result<Vec<Item>> {
        Ok(self
            .read(|d| d.catalog.items_of_kind(kind).cloned().collect())
            .await)
    }

    async fn add_item(&self, item: &Item) -> Result<()> {
        self.mutate(|d| d.add_item(item.clone())).await
    }

    async fn update_item(&self, name: &str, item: &Item) -> Result<()> {
        self.mutate(|d| d.update_item(name, item.clone())).await
    }

    async fn remove_item(&self, name: &str) -> Result<()> {
        self.mutate(|d| {
            d.remove_item(name);
            Ok(())
        })
        .await
    }

    async fn add_rule(&self, rule: &RuleDefinition) -> Result<()> {
        self.mutate(|d| d.add_rule(rule.clone())).await
    }

    async fn update_rule(&self, name: &str, rule: &RuleDefinition) -> Result<()> {
        self.mutate(|d| d.update_rule(name, rule.clone())).await
    }

    async fn remove_rule(&self, name: &str) -> Result<()> {
        self.mutate(|d| {
            d.remove_rule(name);
            Ok(())
        })
        .await
    }

    async fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(|d| d.add_child(parent, child).map(drop)).await
    }

    async fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(|d| {
            d.remove_child(parent, child);
            Ok(())
        })
        .await
    }

    async fn remove_children(&self, parent: &str) -> Result<()> {
        self.mutate(|d| {
            d.remove_children(parent);
            Ok(())
        })
        .await
    }

    async fn get_assignments(&self, username: &str) -> Result<BTreeMap<String, Assignment>> {
        Ok(self.read(|d| d.assignments.assignments_of(username)).await)
    }

    async fn assign(&self, assignment: &Assignment) -> Result<()> {
        self.mutate(|d| d.assign(&assignment.username, &assignment.item_name).map(drop))
            .await
    }

    async fn revoke(&self, username: &str, item_name: &str) -> Result<()> {
        self.mutate(|d| {
            d.assignments.revoke(username, item_name);
            Ok(())
        })
        .await
    }

    async fn revoke_all(&self, username: &str) -> Result<()> {
        self.mutate(|d| {
            d.assignments.revoke_all(username);
            Ok(())
        })
        .await
    }

    async fn get_usernames_by_item(&self, item_name: &str) -> Result<Vec<String>> {
        Ok(self.read(|d| d.assignments.usernames_granted(item_name)).await)
    }

    async fn clear(&self, scope: ClearScope) -> Result<()> {
        self.mutate(|d| {
            d.clear(scope);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::Error;

    async fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.add_item(&Item::role("admin")).await.unwrap();
        storage.add_item(&Item::permission("readPost")).await.unwrap();
        storage.add_child("admin", "readPost").await.unwrap();
        storage
            .assign(&Assignment::new("alice", "admin"))
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_load_returns_written_state() {
        let storage = seeded().await;
        let data = storage.load().await.unwrap();
        assert!(data.catalog.has_edge("admin", "readPost"));
        assert!(data.assignments.contains("alice", "admin"));
    }

    #[tokio::test]
    async fn test_queries() {
        let storage = seeded().await;
        assert!(storage.get_item("admin").await.unwrap().is_some());
        assert!(storage.get_item("ghost").await.unwrap().is_none());
        assert_eq!(storage.get_items(ItemKind::Permission).await.unwrap().len(), 1);
        assert_eq!(storage.get_assignments("alice").await.unwrap().len(), 1);
        assert_eq!(
            storage.get_usernames_by_item("admin").await.unwrap(),
            vec!["alice".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_state() {
        let storage = seeded().await;
        let before = storage.load().await.unwrap();

        let err = storage.add_child("readPost", "admin").await.unwrap_err();
        assert!(matches!(err, Error::CyclicHierarchy { .. }));
        let err = storage.add_item(&Item::role("admin")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));

        assert_eq!(storage.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_remove_item_cascades() {
        let storage = seeded().await;
        storage.remove_item("admin").await.unwrap();
        let data = storage.load().await.unwrap();
        assert!(data.assignments.is_empty());
        assert!(data.catalog.parents_of("readPost").is_empty());
    }

    #[tokio::test]
    async fn test_rules_and_clear() {
        let storage = seeded().await;
        storage
            .add_rule(&RuleDefinition::new("isAuthor", "AuthorRule", json!({})))
            .await
            .unwrap();
        storage
            .update_item("readPost", &Item::permission("readPost").with_rule("isAuthor"))
            .await
            .unwrap();
        storage.remove_rule("isAuthor").await.unwrap();
        let item = storage.get_item("readPost").await.unwrap().unwrap();
        assert!(item.rule_name.is_none());

        storage.clear(ClearScope::All).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), AuthData::new());
    }

    #[tokio::test]
    async fn test_with_data() {
        let mut data = AuthData::new();
        data.add_item(Item::role("seeded")).unwrap();
        let storage = MemoryStorage::with_data(data);
        assert!(storage.get_item("seeded").await.unwrap().is_some());
    }
}
