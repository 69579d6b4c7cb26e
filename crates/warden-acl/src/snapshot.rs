//! Serializable export of the whole authorization graph.

use serde::{Deserialize, Serialize};
use warden_core::{AssignmentRecords, ItemRecords, RuleRecords};

/// Which assignments a snapshot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentsMode<'a> {
    /// Item names directly assigned to one user.
    User(&'a str),
    /// Every user's assignments.
    All,
}

/// Assignment section of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentsView {
    /// Single-user view: a flat list of item names.
    User(Vec<String>),
    /// Admin view: username → item names.
    All(AssignmentRecords),
}

/// Items, rules, and assignments in their wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Items with derived children.
    pub items: ItemRecords,
    /// Rules with JSON-encoded payloads.
    pub rules: RuleRecords,
    /// Assignments in the requested view.
    pub assignments: AssignmentsView,
}
