//! # warden-storage
//!
//! Storage backends for the Warden RBAC engine.
//!
//! - [`MemoryStorage`]: an in-process document, seedable, for tests and
//!   embedded use
//! - [`JsonFileStorage`]: items, assignments, and rules in three JSON files
//!
//! Both implement [`warden_core::Storage`] and apply the same cascades as
//! [`warden_core::AuthData`].

pub mod filesystem;
pub mod memory;

pub use filesystem::JsonFileStorage;
pub use memory::MemoryStorage;
pub use warden_core::Storage;
