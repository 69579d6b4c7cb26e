//! Direct grants of items to users.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// A direct grant edge from a user to an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Opaque user identifier.
    pub username: String,
    /// Granted item.
    pub item_name: String,
}

impl Assignment {
    /// Creates an assignment.
    pub fn new(username: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            item_name: item_name.into(),
        }
    }
}

/// User → item → assignment index.
///
/// At most one assignment exists per (username, item) pair. The store does
/// not know the catalog; callers check item existence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssignmentStore {
    by_user: BTreeMap<String, BTreeMap<String, Assignment>>,
}

impl AssignmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `item_name` to `username`.
    ///
    /// Fails with [`Error::DuplicateAssignment`] if the pair already exists.
    pub fn assign(&mut self, username: &str, item_name: &str) -> Result<Assignment> {
        let user = self.by_user.entry(username.to_string()).or_default();
        if user.contains_key(item_name) {
            return Err(Error::DuplicateAssignment {
                username: username.to_string(),
                item: item_name.to_string(),
            });
        }
        let assignment = Assignment::new(username, item_name);
        user.insert(item_name.to_string(), assignment.clone());
        Ok(assignment)
    }

    /// Removes a single grant. Returns whether it existed.
    pub fn revoke(&mut self, username: &str, item_name: &str) -> bool {
        let Some(user) = self.by_user.get_mut(username) else {
            return false;
        };
        let removed = user.remove(item_name).is_some();
        if user.is_empty() {
            self.by_user.remove(username);
        }
        removed
    }

    /// Removes every grant held by `username`. Returns whether any existed.
    pub fn revoke_all(&mut self, username: &str) -> bool {
        self.by_user.remove(username).is_some()
    }

    /// Returns the grant for the pair, if any.
    pub fn get(&self, username: &str, item_name: &str) -> Option<&Assignment> {
        self.by_user.get(username)?.get(item_name)
    }

    /// Returns whether the pair is granted.
    pub fn contains(&self, username: &str, item_name: &str) -> bool {
        self.get(username, item_name).is_some()
    }

    /// All grants held by `username`, keyed by item name.
    pub fn assignments_of(&self, username: &str) -> BTreeMap<String, Assignment> {
        self.by_user.get(username).cloned().unwrap_or_default()
    }

    /// Users holding a direct grant to `item_name`, sorted.
    pub fn usernames_granted(&self, item_name: &str) -> Vec<String> {
        self.by_user
            .iter()
            .filter(|(_, items)| items.contains_key(item_name))
            .map(|(user, _)| user.clone())
            .collect()
    }

    /// Drops every grant referencing `item_name`. Returns how many were removed.
    pub fn remove_item(&mut self, item_name: &str) -> usize {
        let mut removed = 0;
        for items in self.by_user.values_mut() {
            if items.remove(item_name).is_some() {
                removed += 1;
            }
        }
        self.by_user.retain(|_, items| !items.is_empty());
        removed
    }

    /// Repoints grants from `old` to `new`.
    pub fn rename_item(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        for (user, items) in self.by_user.iter_mut() {
            if items.remove(old).is_some() {
                items.insert(new.to_string(), Assignment::new(user.as_str(), new));
            }
        }
    }

    /// Usernames with at least one grant, sorted.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.by_user.keys().map(String::as_str)
    }

    /// Every assignment in the store.
    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.by_user.values().flat_map(|items| items.values())
    }

    /// Total number of assignments.
    pub fn len(&self) -> usize {
        self.by_user.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if there are no assignments.
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.by_user.clear();
    }
}
