//! # warden-cli
//!
//! Administration CLI for Warden.
//!
//! - Access checks and graph export
//! - Role, permission, hierarchy, and assignment management
//! - Configuration management (`config path|get|init|export`)
//! - The introspection server (`serve`)

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_handlers;
pub mod error;

pub use cli::Cli;
pub use config::WardenConfig;
pub use error::{Error, Result};
