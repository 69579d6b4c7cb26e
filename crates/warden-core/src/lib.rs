//! Warden Core: the authoritative RBAC data model.
//!
//! This crate provides the types shared across all Warden crates.
//! It has no internal Warden dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`item`]: Roles and permissions
//! - [`rule`]: The rule capability and its persisted form
//! - [`assignment`]: Direct user grants and their store
//! - [`catalog`]: Item catalog and the hierarchy graph
//! - [`data`]: The persisted document with cascading mutations
//! - [`records`]: JSON wire records
//! - [`traits`]: Storage and configuration contracts

pub mod assignment;
pub mod catalog;
pub mod data;
pub mod error;
pub mod item;
pub mod records;
pub mod rule;
pub mod traits;

mod proptests;

// Re-export key types at crate root for convenience
pub use assignment::{Assignment, AssignmentStore};
pub use catalog::Catalog;
pub use data::{AuthData, ClearScope};
pub use error::{Error, Result};
pub use item::{Item, ItemKind};
pub use records::{AssignmentRecords, ItemRecord, ItemRecords, RulePayload, RuleRecord, RuleRecords};
pub use rule::{BasicRule, Rule, RuleDefinition, RuleParams};
pub use traits::{ConfigManager, Storage};
