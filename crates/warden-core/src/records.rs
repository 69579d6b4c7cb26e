//! Wire records shared by the JSON file backend and the snapshot export.
//!
//! ```text
//! items:       { name: { type, name, description?, ruleName?, children: [name, ...],
//!                        parents?: [name, ...] } }
//! rules:       { name: { name, data: { typeName, rule: "<json payload>" } } }
//! assignments: { username: [itemName, ...] }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AssignmentStore, Catalog, Item, ItemKind, Result, RuleDefinition};

/// Serialized item with its derived children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Role or permission.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Item name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Gating rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    /// Direct children.
    #[serde(default)]
    pub children: Vec<String>,
    /// Direct parents in the order their edges were added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl ItemRecord {
    /// Builds a record from an item and its children.
    pub fn new(item: &Item, children: Vec<String>) -> Self {
        Self {
            kind: item.kind,
            name: item.name.clone(),
            description: item.description.clone(),
            rule_name: item.rule_name.clone(),
            children,
            parents: Vec::new(),
        }
    }

    /// Sets the ordered parents.
    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    /// The item stored under `name`, dropping the children.
    pub fn to_item(&self, name: &str) -> Item {
        Item {
            kind: self.kind,
            name: name.to_string(),
            description: self.description.clone(),
            rule_name: self.rule_name.clone(),
        }
    }
}

/// Rule type plus its JSON-encoded payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePayload {
    /// Factory key.
    pub type_name: String,
    /// JSON-encoded rule data.
    pub rule: String,
}

/// Serialized rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Rule name.
    pub name: String,
    /// Type and payload.
    pub data: RulePayload,
}

impl RuleRecord {
    /// Encodes a definition.
    pub fn from_definition(definition: &RuleDefinition) -> Result<Self> {
        Ok(Self {
            name: definition.name.clone(),
            data: RulePayload {
                type_name: definition.type_name.clone(),
                rule: serde_json::to_string(&definition.data)?,
            },
        })
    }

    /// Decodes into the definition stored under `name`.
    ///
    /// An empty payload string decodes to an empty object.
    pub fn to_definition(&self, name: &str) -> Result<RuleDefinition> {
        let data = if self.data.rule.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.data.rule)?
        };
        Ok(RuleDefinition::new(name, self.data.type_name.clone(), data))
    }
}

/// `items` section keyed by item name, in file order.
pub type ItemRecords = IndexMap<String, ItemRecord>;

/// `rules` section keyed by rule name.
pub type RuleRecords = BTreeMap<String, RuleRecord>;

/// Admin view of assignments: username → item names.
pub type AssignmentRecords = BTreeMap<String, Vec<String>>;

/// Serializes every item, children derived by scanning the hierarchy.
pub fn item_records(catalog: &Catalog) -> ItemRecords {
    catalog
        .items()
        .map(|item| {
            let children = catalog.children_of(&item.name);
            let parents = catalog.parents_of(&item.name).to_vec();
            (
                item.name.clone(),
                ItemRecord::new(item, children).with_parents(parents),
            )
        })
        .collect()
}

/// Serializes rule definitions.
pub fn rule_records<I>(definitions: I) -> Result<RuleRecords>
where
    I: IntoIterator<Item = RuleDefinition>,
{
    definitions
        .into_iter()
        .map(|def| Ok((def.name.clone(), RuleRecord::from_definition(&def)?)))
        .collect()
}

/// Serializes all assignments as username → item names.
pub fn assignment_records(store: &AssignmentStore) -> AssignmentRecords {
    store
        .usernames()
        .map(|user| {
            let items = store.assignments_of(user).into_keys().collect();
            (user.to_string(), items)
        })
        .collect()
}
