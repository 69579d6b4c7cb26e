//! Command-line definitions.

use clap::{Parser, Subcommand};

/// Warden - hierarchical role-based access control administration
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check whether a user holds an item
    Check {
        /// Username
        user: String,
        /// Item name
        item: String,
        /// Rule parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },

    /// Print the authorization graph as JSON
    Export {
        /// Include every user's assignments
        #[arg(long)]
        all_assignments: bool,
        /// User whose assignments to include
        #[arg(long, conflicts_with = "all_assignments")]
        user: Option<String>,
    },

    /// Manage roles and permissions
    Item {
        /// Item action
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Manage the hierarchy
    Child {
        /// Hierarchy action
        #[command(subcommand)]
        action: ChildAction,
    },

    /// Grant an item to a user
    Assign {
        /// Item name
        item: String,
        /// Username
        user: String,
    },

    /// Take an item away from a user
    Revoke {
        /// Item name
        item: String,
        /// Username
        user: String,
    },

    /// Configuration management
    Config {
        /// Config action
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Serve the introspection endpoint
    Serve,
}

/// `item` subcommands.
#[derive(Subcommand, Debug)]
pub enum ItemAction {
    /// Add a role or permission
    Add {
        /// `role` or `permission`
        kind: String,
        /// Item name
        name: String,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
        /// Rule gating the item
        #[arg(short, long)]
        rule: Option<String>,
    },
    /// Remove an item with its edges and assignments
    Remove {
        /// Item name
        name: String,
    },
    /// List items
    List {
        /// Only `role` or `permission`
        #[arg(long)]
        kind: Option<String>,
    },
}

/// `child` subcommands.
#[derive(Subcommand, Debug)]
pub enum ChildAction {
    /// Add a parent-to-child edge
    Add {
        /// Parent item
        parent: String,
        /// Child item
        child: String,
    },
    /// Remove a parent-to-child edge
    Remove {
        /// Parent item
        parent: String,
        /// Child item
        child: String,
    },
    /// List direct children
    List {
        /// Parent item
        parent: String,
    },
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path
    Path,
    /// Print a value by dotted key
    Get {
        /// Dotted key, e.g. `server.port`
        key: String,
    },
    /// Write a default config file
    Init {
        /// Target file (defaults to the resolved path)
        #[arg(long)]
        file: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config as environment variables
    Export {
        /// Format as docker `--env` flags
        #[arg(long)]
        docker_env: bool,
    },
}
