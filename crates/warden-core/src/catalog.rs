//! Item catalog and hierarchy graph.
//!
//! Items are keyed by unique name. Hierarchy edges are stored child-indexed
//! (child → parents, in insertion order); children are derived by scanning.
//!
//! Invariants maintained by every mutation:
//! - both endpoints of an edge exist in the catalog;
//! - the edge set is acyclic (no item is its own ancestor).

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::{Error, Item, ItemKind, Result};

/// All roles and permissions plus the parent/child edges between them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    items: BTreeMap<String, Item>,
    parents: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    /// Looks up an item by name.
    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    /// Returns whether an item with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the catalog holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items, ordered by name.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Items of one kind, ordered by name.
    pub fn items_of_kind(&self, kind: ItemKind) -> impl Iterator<Item = &Item> {
        self.items.values().filter(move |item| item.kind == kind)
    }

    /// Inserts a new item. Names are unique across roles and permissions.
    pub fn put(&mut self, item: Item) -> Result<()> {
        if self.items.contains_key(&item.name) {
            return Err(Error::duplicate_item(&item.name));
        }
        self.items.insert(item.name.clone(), item);
        Ok(())
    }

    /// Replaces the item stored under `name`, renaming it if `item.name` differs.
    ///
    /// Edges referencing the old name follow the rename.
    pub fn replace(&mut self, name: &str, item: Item) -> Result<()> {
        if !self.items.contains_key(name) {
            return Err(Error::item_not_found(name));
        }
        if item.name != name && self.items.contains_key(&item.name) {
            return Err(Error::duplicate_item(&item.name));
        }

        let new_name = item.name.clone();
        self.items.remove(name);
        self.items.insert(new_name.clone(), item);

        if new_name != name {
            if let Some(parents) = self.parents.remove(name) {
                self.parents.insert(new_name.clone(), parents);
            }
            for parents in self.parents.values_mut() {
                for parent in parents.iter_mut() {
                    if parent == name {
                        *parent = new_name.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes an item and severs every edge touching it.
    pub fn remove(&mut self, name: &str) -> Option<Item> {
        let item = self.items.remove(name)?;
        self.parents.remove(name);
        self.detach_parent(name);
        Some(item)
    }

    /// Removes every item of `kind`, returning the removed names.
    pub fn remove_kind(&mut self, kind: ItemKind) -> Vec<String> {
        let names: Vec<String> = self
            .items_of_kind(kind)
            .map(|item| item.name.clone())
            .collect();
        for name in &names {
            self.remove(name);
        }
        names
    }

    /// Removes all items and edges.
    pub fn clear(&mut self) {
        self.items.clear();
        self.parents.clear();
    }

    /// Items gated by `rule_name`.
    pub fn items_with_rule<'a>(&'a self, rule_name: &'a str) -> impl Iterator<Item = &'a Item> {
        self.items
            .values()
            .filter(move |item| item.rule_name.as_deref() == Some(rule_name))
    }

    /// Repoints every item gated by `old` to `new` (or clears the rule when
    /// `new` is `None`). Returns the number of items touched.
    pub fn repoint_rule(&mut self, old: &str, new: Option<&str>) -> usize {
        let mut touched = 0;
        for item in self.items.values_mut() {
            if item.rule_name.as_deref() == Some(old) {
                item.rule_name = new.map(str::to_string);
                touched += 1;
            }
        }
        touched
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    /// Direct parents of `child`, in edge insertion order.
    pub fn parents_of(&self, child: &str) -> &[String] {
        self.parents.get(child).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct children of `parent`, ordered by name.
    pub fn children_of(&self, parent: &str) -> Vec<String> {
        self.parents
            .iter()
            .filter(|(_, parents)| parents.iter().any(|p| p == parent))
            .map(|(child, _)| child.clone())
            .collect()
    }

    /// Returns whether `parent → child` is a direct edge.
    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        self.parents_of(child).iter().any(|p| p == parent)
    }

    /// Returns whether `ancestor` is reachable from `name` by following
    /// parent edges upward. An item is its own ancestor.
    pub fn is_ancestor(&self, ancestor: &str, name: &str) -> bool {
        if ancestor == name {
            return true;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(name);
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for parent in self.parents_of(current) {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent.as_str()) {
                    queue.push_back(parent.as_str());
                }
            }
        }
        false
    }

    /// Validates a prospective edge without mutating anything.
    pub fn check_edge(&self, parent: &str, child: &str) -> Result<()> {
        if !self.contains(parent) {
            return Err(Error::item_not_found(parent));
        }
        if !self.contains(child) {
            return Err(Error::item_not_found(child));
        }
        if self.is_ancestor(child, parent) {
            return Err(Error::CyclicHierarchy {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        Ok(())
    }

    /// Returns whether [`add_edge`](Self::add_edge) would succeed.
    pub fn can_add_edge(&self, parent: &str, child: &str) -> bool {
        self.check_edge(parent, child).is_ok()
    }

    /// Adds `parent → child`. Returns `false` if the edge already existed.
    ///
    /// Rejected edges leave the graph unchanged.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<bool> {
        if self.has_edge(parent, child) {
            return Ok(false);
        }
        self.check_edge(parent, child)?;
        self.parents
            .entry(child.to_string())
            .or_default()
            .push(parent.to_string());
        Ok(true)
    }

    /// Removes `parent → child`. Returns whether the edge existed.
    pub fn remove_edge(&mut self, parent: &str, child: &str) -> bool {
        let Some(parents) = self.parents.get_mut(child) else {
            return false;
        };
        let before = parents.len();
        parents.retain(|p| p != parent);
        let removed = parents.len() != before;
        if parents.is_empty() {
            self.parents.remove(child);
        }
        removed
    }

    /// Removes every edge from `parent` to its children. Returns whether any existed.
    pub fn remove_edges_from(&mut self, parent: &str) -> bool {
        self.detach_parent(parent) > 0
    }

    /// Every item reachable below `name`, breadth-first, excluding `name`.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut result = Vec::new();
        visited.insert(name.to_string());
        queue.push_back(name.to_string());

        while let Some(current) = queue.pop_front() {
            for child in self.children_of(&current) {
                if visited.insert(child.clone()) {
                    result.push(child.clone());
                    queue.push_back(child);
                }
            }
        }
        result
    }

    /// All edges as `(parent, child)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parents.iter().flat_map(|(child, parents)| {
            parents
                .iter()
                .map(move |parent| (parent.as_str(), child.as_str()))
        })
    }

    fn detach_parent(&mut self, parent: &str) -> usize {
        let mut removed = 0;
        for parents in self.parents.values_mut() {
            let before = parents.len();
            parents.retain(|p| p != parent);
            removed += before - parents.len();
        }
        self.parents.retain(|_, parents| !parents.is_empty());
        removed
    }
}
