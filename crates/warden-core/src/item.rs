//! Roles and permissions.
//!
//! Both are the same record distinguished by [`ItemKind`]; item names are
//! unique across the two kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Discriminates roles from permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A role, usually a bundle of other items.
    Role,
    /// A single capability.
    Permission,
}

impl ItemKind {
    /// Returns the kind as it appears in serialized data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "role" => Ok(Self::Role),
            "permission" => Ok(Self::Permission),
            other => Err(Error::UnsupportedObjectType(other.to_string())),
        }
    }
}

/// A named role or permission in the authorization graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Role or permission.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the rule gating this item, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

impl Item {
    /// Creates an item of the given kind with no description or rule.
    pub fn new(kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: None,
            rule_name: None,
        }
    }

    /// Creates a role.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::{Item, ItemKind};
    ///
    /// let role = Item::role("admin");
    /// assert_eq!(role.kind, ItemKind::Role);
    /// assert!(role.rule_name.is_none());
    /// ```
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(ItemKind::Role, name)
    }

    /// Creates a permission.
    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(ItemKind::Permission, name)
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Gates the item with the named rule.
    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    /// Returns `true` for roles.
    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }

    /// Returns `true` for permissions.
    pub fn is_permission(&self) -> bool {
        self.kind == ItemKind::Permission
    }
}
