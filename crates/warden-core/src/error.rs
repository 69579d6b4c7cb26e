//! Error types for warden-core.
//!
//! An unknown item name is not represented here: checking access to an item
//! that does not exist is a plain `false`, never an error.

use std::path::{Path, PathBuf};

/// Result type alias for Warden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing or evaluating the authorization graph.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An item references a rule that is not present in the rule registry.
    #[error("Rule \"{name}\" does not exist, or rules are not loaded")]
    RuleNotFound {
        /// Name of the missing rule.
        name: String,
    },

    /// A persisted rule names a type with no registered factory.
    #[error("Rule \"{name}\" has type \"{type_name}\" which is not registered")]
    RuleTypeNotRegistered {
        /// Rule name.
        name: String,
        /// Unregistered type name.
        type_name: String,
    },

    /// Adding the edge would make an item its own ancestor.
    #[error("Cannot add \"{child}\" as a child of \"{parent}\": a cycle would be created")]
    CyclicHierarchy {
        /// Requested parent.
        parent: String,
        /// Requested child.
        child: String,
    },

    /// An item or rule with this name already exists.
    #[error("{kind} \"{name}\" already exists")]
    DuplicateName {
        /// What kind of object collided ("Item" or "Rule").
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// The user already holds a direct assignment to the item.
    #[error("User \"{username}\" is already assigned \"{item}\"")]
    DuplicateAssignment {
        /// Username.
        username: String,
        /// Item name.
        item: String,
    },

    /// A write referenced an item that is not in the catalog.
    #[error("Item \"{name}\" not found")]
    ItemNotFound {
        /// Missing item name.
        name: String,
    },

    /// An object that is neither a role, a permission, nor a rule.
    #[error("Unsupported object type: {0}")]
    UnsupportedObjectType(String),

    /// No branch granted access and at least one rule evaluation timed out.
    #[error("Rule evaluation timed out after {millis}ms while checking \"{item}\"")]
    Timeout {
        /// Item whose check could not complete.
        item: String,
        /// Configured per-rule timeout.
        millis: u64,
    },

    /// Persistence backend failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Source error if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O error with the offending path.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic.
        message: String,
    },
}

impl Error {
    /// Returns whether this error indicates corrupted or incompletely loaded
    /// authorization data, as opposed to a rejected write or an I/O failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::RuleNotFound { .. } | Error::RuleTypeNotRegistered { .. }
        )
    }

    /// Creates a rule-not-found error.
    pub fn rule_not_found(name: impl Into<String>) -> Self {
        Error::RuleNotFound { name: name.into() }
    }

    /// Creates an item-not-found error.
    pub fn item_not_found(name: impl Into<String>) -> Self {
        Error::ItemNotFound { name: name.into() }
    }

    /// Creates a duplicate-name error for an item.
    pub fn duplicate_item(name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind: "Item",
            name: name.into(),
        }
    }

    /// Creates a duplicate-name error for a rule.
    pub fn duplicate_rule(name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind: "Rule",
            name: name.into(),
        }
    }

    /// Creates a new storage error.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source error.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
