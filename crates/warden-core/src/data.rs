//! The persisted authorization document.
//!
//! [`AuthData`] is what a [`Storage`](crate::Storage) backend loads and what
//! document-style backends mutate. Every mutation applies the same
//! cascading rules as the in-memory engine:
//! - removing an item severs its edges and drops its assignments;
//! - removing a rule clears `rule_name` on the items it gated;
//! - renaming an item or rule rewrites every reference to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::records::{self, AssignmentRecords, ItemRecords, RuleRecords};
use crate::{Assignment, AssignmentStore, Catalog, Error, Item, ItemKind, Result, RuleDefinition};

/// Which part of the document a bulk removal targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    /// Items, edges, rules, and assignments.
    All,
    /// Roles with their edges and assignments.
    Roles,
    /// Permissions with their edges and assignments.
    Permissions,
    /// Rules; items keep existing but lose their gate.
    Rules,
    /// Assignments only.
    Assignments,
}

/// Items, hierarchy, rule definitions, and assignments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthData {
    /// Items and hierarchy edges.
    pub catalog: Catalog,
    /// Rule definitions keyed by name.
    pub rules: BTreeMap<String, RuleDefinition>,
    /// Direct grants.
    pub assignments: AssignmentStore,
}

impl AuthData {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new item.
    pub fn add_item(&mut self, item: Item) -> Result<()> {
        self.catalog.put(item)
    }

    /// Replaces (and possibly renames) the item stored under `name`.
    pub fn update_item(&mut self, name: &str, item: Item) -> Result<()> {
        let new_name = item.name.clone();
        self.catalog.replace(name, item)?;
        self.assignments.rename_item(name, &new_name);
        Ok(())
    }

    /// Removes an item with its edges and assignments.
    pub fn remove_item(&mut self, name: &str) -> bool {
        if self.catalog.remove(name).is_none() {
            return false;
        }
        self.assignments.remove_item(name);
        true
    }

    /// Inserts a new rule definition.
    pub fn add_rule(&mut self, rule: RuleDefinition) -> Result<()> {
        if self.rules.contains_key(&rule.name) {
            return Err(Error::duplicate_rule(&rule.name));
        }
        self.rules.insert(rule.name.clone(), rule);
        Ok(())
    }

    /// Replaces (and possibly renames) the rule stored under `name`.
    pub fn update_rule(&mut self, name: &str, rule: RuleDefinition) -> Result<()> {
        if !self.rules.contains_key(name) {
            return Err(Error::rule_not_found(name));
        }
        if rule.name != name && self.rules.contains_key(&rule.name) {
            return Err(Error::duplicate_rule(&rule.name));
        }
        let new_name = rule.name.clone();
        self.rules.remove(name);
        self.rules.insert(new_name.clone(), rule);
        if new_name != name {
            self.catalog.repoint_rule(name, Some(&new_name));
        }
        Ok(())
    }

    /// Removes a rule and ungates the items referencing it.
    pub fn remove_rule(&mut self, name: &str) -> bool {
        if self.rules.remove(name).is_none() {
            return false;
        }
        self.catalog.repoint_rule(name, None);
        true
    }

    /// Adds a hierarchy edge. Returns `false` if it already existed.
    pub fn add_child(&mut self, parent: &str, child: &str) -> Result<bool> {
        self.catalog.add_edge(parent, child)
    }

    /// Removes a hierarchy edge.
    pub fn remove_child(&mut self, parent: &str, child: &str) -> bool {
        self.catalog.remove_edge(parent, child)
    }

    /// Removes all edges below `parent`.
    pub fn remove_children(&mut self, parent: &str) -> bool {
        self.catalog.remove_edges_from(parent)
    }

    /// Grants an existing item to a user.
    pub fn assign(&mut self, username: &str, item_name: &str) -> Result<Assignment> {
        if !self.catalog.contains(item_name) {
            return Err(Error::item_not_found(item_name));
        }
        self.assignments.assign(username, item_name)
    }

    /// Bulk removal.
    pub fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::All => {
                self.catalog.clear();
                self.rules.clear();
                self.assignments.clear();
            }
            ClearScope::Roles => self.remove_kind(ItemKind::Role),
            ClearScope::Permissions => self.remove_kind(ItemKind::Permission),
            ClearScope::Rules => {
                let names: Vec<String> = self.rules.keys().cloned().collect();
                for name in names {
                    self.remove_rule(&name);
                }
            }
            ClearScope::Assignments => self.assignments.clear(),
        }
    }

    fn remove_kind(&mut self, kind: ItemKind) {
        for name in self.catalog.remove_kind(kind) {
            self.assignments.remove_item(&name);
        }
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// Serializes the items section.
    pub fn item_records(&self) -> ItemRecords {
        records::item_records(&self.catalog)
    }

    /// Serializes the rules section.
    pub fn rule_records(&self) -> Result<RuleRecords> {
        records::rule_records(self.rules.values().cloned())
    }

    /// Serializes the assignments section.
    pub fn assignment_records(&self) -> AssignmentRecords {
        records::assignment_records(&self.assignments)
    }

    /// Rebuilds a document from its three record sections.
    ///
    /// Edges come from each record's `parents` first, which keeps the order
    /// they were added in, then from `children` lists in file order for any
    /// edge not yet seen. Edges naming unknown items are dropped. Edges that
    /// would close a cycle and assignments to unknown items are dropped with
    /// a warning.
    pub fn from_records(
        items: ItemRecords,
        rules: RuleRecords,
        assignments: AssignmentRecords,
    ) -> Result<Self> {
        let mut data = AuthData::new();

        for (name, record) in &items {
            data.catalog.put(record.to_item(name))?;
        }

        for (name, record) in &items {
            for parent in &record.parents {
                data.link(parent, name);
            }
        }
        for (name, record) in &items {
            for child in &record.children {
                data.link(name, child);
            }
        }

        for (name, record) in &rules {
            data.rules.insert(name.clone(), record.to_definition(name)?);
        }

        for (username, item_names) in &assignments {
            for item_name in item_names {
                match data.assign(username, item_name) {
                    Ok(_) | Err(Error::DuplicateAssignment { .. }) => {}
                    Err(e) => log::warn!("Dropping assignment {username} -> {item_name}: {e}"),
                }
            }
        }

        Ok(data)
    }

    fn link(&mut self, parent: &str, child: &str) {
        if !self.catalog.contains(parent) || !self.catalog.contains(child) {
            log::debug!("Dropping edge {parent} -> {child}: unknown item");
            return;
        }
        if let Err(e) = self.catalog.add_edge(parent, child) {
            log::warn!("Dropping edge {parent} -> {child}: {e}");
        }
    }
}
