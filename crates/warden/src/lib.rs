//! Warden access control: umbrella crate.
//!
//! Re-exports the engine, its data model, and the storage backends, plus
//! the HTTP middleware, introspection server, and CLI behind feature flags.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden::acl::{Manager, ManagerOptions};
//! use warden::storage::JsonFileStorage;
//!
//! let manager = Manager::new(
//!     Arc::new(JsonFileStorage::in_dir("rbac")),
//!     ManagerOptions::default().with_default_roles(["guest"]),
//! );
//! let allowed = manager.check_access("alice", "updatePost", &params).await?;
//! ```

pub use warden_acl as acl;
pub use warden_core as core;
pub use warden_storage as storage;

pub use warden_acl::{Manager, ManagerOptions};
pub use warden_core::{Error, Item, ItemKind, Result, Rule, RuleParams};

#[cfg(feature = "auth")]
pub use warden_auth as auth;

#[cfg(feature = "api")]
pub use warden_api as api;

#[cfg(feature = "cli")]
pub use warden_cli as cli;
