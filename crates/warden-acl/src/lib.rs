//! # warden-acl
//!
//! The Warden access-check engine.
//!
//! - [`rules`]: live rule registry and rule-type factories
//! - [`checker`]: the grant-resolution algorithm
//! - [`manager`]: the management facade with lazy loading and serialized writes
//! - [`snapshot`]: wire-shaped export of the whole graph
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_acl::{Manager, ManagerOptions};
//! use warden_core::{Item, RuleParams};
//! use warden_storage::MemoryStorage;
//!
//! let auth = Manager::new(Arc::new(MemoryStorage::new()), ManagerOptions::default());
//! auth.add(Item::role("admin")).await?;
//! auth.add(Item::permission("readPost")).await?;
//! auth.add_child("admin", "readPost").await?;
//! auth.assign("admin", "alice").await?;
//! assert!(auth.check_access("alice", "readPost", &RuleParams::new()).await?);
//! ```

pub mod checker;
pub mod manager;
pub mod rules;
pub mod snapshot;

mod proptests;
#[cfg(test)]
mod test_rules;

pub use checker::{AccessChecker, AccessGraph};
pub use manager::{AuthObject, Manager, ManagerOptions};
pub use rules::{RuleFactory, RuleRegistry, RuleTypes, UnboundRule};
pub use snapshot::{AssignmentsMode, AssignmentsView, Snapshot};
pub use warden_core::{Error, Result};
