//! # warden-api
//!
//! HTTP introspection endpoint for Warden.
//!
//! [`Server`] exposes the authorization graph (items, rules, assignments)
//! as JSON at a configurable path, behind the identity middleware from
//! `warden-auth`.

pub mod error;
pub mod server;

pub use error::{Error, Result};
pub use server::{DEFAULT_PATH, Server, ServerConfig, SnapshotQuery};
