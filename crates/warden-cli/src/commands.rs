//! Command implementations.
//!
//! Each command runs against a [`Manager`] and returns the text to print.

use std::str::FromStr;
use std::sync::Arc;

use warden_acl::{AssignmentsMode, Manager};
use warden_api::Server;
use warden_core::{Item, ItemKind, RuleParams};

use crate::cli::{ChildAction, Command, ItemAction};
use crate::config::WardenConfig;
use crate::config_handlers::handle_config_command;
use crate::{Error, Result};

/// Runs `command`. `config_path` is the `--config` flag as given.
pub async fn run(
    command: &Command,
    config: &WardenConfig,
    config_path: Option<&str>,
) -> Result<String> {
    log::debug!("Running {command:?}");
    if let Command::Config { action } = command {
        return Ok(handle_config_command(config_path, action)?);
    }

    let manager = Arc::new(config.manager());
    match command {
        Command::Check { user, item, params } => {
            check(&manager, user, item, params.as_deref()).await
        }
        Command::Export {
            all_assignments,
            user,
        } => {
            let mode = match user {
                Some(user) if !all_assignments => AssignmentsMode::User(user),
                _ => AssignmentsMode::All,
            };
            export(&manager, mode).await
        }
        Command::Item { action } => item(&manager, action).await,
        Command::Child { action } => child(&manager, action).await,
        Command::Assign { item, user } => {
            let assignment = manager.assign(item, user).await?;
            Ok(format!(
                "Assigned {} to {}",
                assignment.item_name, assignment.username
            ))
        }
        Command::Revoke { item, user } => {
            if manager.revoke(item, user).await? {
                Ok(format!("Revoked {item} from {user}"))
            } else {
                Ok(format!("{user} was not assigned {item}"))
            }
        }
        Command::Serve => {
            Server::new(manager, config.server_config())
                .with_identity(config.identity())
                .serve()
                .await?;
            Ok(String::new())
        }
        Command::Config { .. } => Ok(String::new()),
    }
}

/// Parses `--params` into rule parameters.
pub fn parse_params(raw: Option<&str>) -> Result<RuleParams> {
    match raw {
        None => Ok(RuleParams::new()),
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::InvalidParams("expected a JSON object".to_string())),
            Err(e) => Err(Error::InvalidParams(e.to_string())),
        },
    }
}

/// `check`.
pub async fn check(
    manager: &Manager,
    user: &str,
    item: &str,
    params: Option<&str>,
) -> Result<String> {
    let params = parse_params(params)?;
    let granted = manager.check_access(user, item, &params).await?;
    let verdict = if granted { "granted" } else { "denied" };
    Ok(format!("{user} {item}: {verdict}"))
}

/// `export`.
pub async fn export(manager: &Manager, mode: AssignmentsMode<'_>) -> Result<String> {
    let snapshot = manager.snapshot(mode).await?;
    serde_json::to_string_pretty(&snapshot)
        .map_err(|e| Error::Core(warden_core::Error::from(e)))
}

/// `item ...`.
pub async fn item(manager: &Manager, action: &ItemAction) -> Result<String> {
    match action {
        ItemAction::Add {
            kind,
            name,
            description,
            rule,
        } => {
            let mut item = Item::new(ItemKind::from_str(kind)?, name);
            if let Some(description) = description {
                item = item.with_description(description);
            }
            if let Some(rule) = rule {
                item = item.with_rule(rule);
            }
            manager.add(item).await?;
            Ok(format!("Added {kind} {name}"))
        }
        ItemAction::Remove { name } => {
            if manager.remove_item(name).await? {
                Ok(format!("Removed {name}"))
            } else {
                Ok(format!("No item named {name}"))
            }
        }
        ItemAction::List { kind } => {
            let items = match kind.as_deref().map(ItemKind::from_str).transpose()? {
                Some(ItemKind::Role) => manager.get_roles().await?,
                Some(ItemKind::Permission) => manager.get_permissions().await?,
                None => {
                    let mut all = manager.get_roles().await?;
                    all.extend(manager.get_permissions().await?);
                    all
                }
            };
            Ok(items.iter().map(describe).collect::<Vec<_>>().join("\n"))
        }
    }
}

/// `child ...`.
pub async fn child(manager: &Manager, action: &ChildAction) -> Result<String> {
    match action {
        ChildAction::Add { parent, child } => {
            if manager.add_child(parent, child).await? {
                Ok(format!("{parent} -> {child}"))
            } else {
                Ok(format!("{parent} -> {child} already exists"))
            }
        }
        ChildAction::Remove { parent, child } => {
            if manager.remove_child(parent, child).await? {
                Ok(format!("Removed {parent} -> {child}"))
            } else {
                Ok(format!("No edge {parent} -> {child}"))
            }
        }
        ChildAction::List { parent } => Ok(manager
            .get_children(parent)
            .await?
            .iter()
            .map(describe)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn describe(item: &Item) -> String {
    let mut line = format!("{:<10} {}", item.kind.as_str(), item.name);
    if let Some(rule) = &item.rule_name {
        line.push_str(&format!(" [rule: {rule}]"));
    }
    if let Some(description) = &item.description {
        line.push_str(&format!(" - {description}"));
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use warden_acl::ManagerOptions;
    use warden_storage::{JsonFileStorage, MemoryStorage};

    async fn manager() -> Manager {
        let manager = Manager::new(Arc::new(MemoryStorage::new()), ManagerOptions::default());
        item(
            &manager,
            &ItemAction::Add {
                kind: "role".to_string(),
                name: "author".to_string(),
                description: Some("Writes posts".to_string()),
                rule: None,
            },
        )
        .await
        .unwrap();
        item(
            &manager,
            &ItemAction::Add {
                kind: "permission".to_string(),
                name: "createPost".to_string(),
                description: None,
                rule: None,
            },
        )
        .await
        .unwrap();
        manager
    }

    // ------------------------------------------------------------------------
    // params
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_params() {
        assert!(parse_params(None).unwrap().is_empty());
        let params = parse_params(Some(r#"{"authorId":"alice"}"#)).unwrap();
        assert_eq!(params["authorId"], "alice");
        assert!(matches!(parse_params(Some("[1]")), Err(Error::InvalidParams(_))));
        assert!(matches!(parse_params(Some("{")), Err(Error::InvalidParams(_))));
    }

    // ------------------------------------------------------------------------
    // item / child / assign
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_item_list_and_kind_filter() {
        let manager = manager().await;
        let all = item(&manager, &ItemAction::List { kind: None }).await.unwrap();
        assert!(all.contains("author - Writes posts"));
        assert!(all.contains("createPost"));

        let roles = item(
            &manager,
            &ItemAction::List {
                kind: Some("role".to_string()),
            },
        )
        .await
        .unwrap();
        assert!(!roles.contains("createPost"));
    }

    #[tokio::test]
    async fn test_item_add_bad_kind() {
        let manager = manager().await;
        let err = item(
            &manager,
            &ItemAction::Add {
                kind: "group".to_string(),
                name: "x".to_string(),
                description: None,
                rule: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Core(warden_core::Error::UnsupportedObjectType(_))
        ));
    }

    #[tokio::test]
    async fn test_child_and_check() {
        let manager = manager().await;
        let add = ChildAction::Add {
            parent: "author".to_string(),
            child: "createPost".to_string(),
        };
        assert_eq!(child(&manager, &add).await.unwrap(), "author -> createPost");
        assert!(child(&manager, &add).await.unwrap().contains("already exists"));

        let listed = child(
            &manager,
            &ChildAction::List {
                parent: "author".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(listed.contains("createPost"));

        manager.assign("author", "alice").await.unwrap();
        assert_eq!(
            check(&manager, "alice", "createPost", None).await.unwrap(),
            "alice createPost: granted"
        );
        assert_eq!(
            check(&manager, "bob", "createPost", None).await.unwrap(),
            "bob createPost: denied"
        );
    }

    #[tokio::test]
    async fn test_cycle_is_reported() {
        let manager = manager().await;
        manager.add_child("author", "createPost").await.unwrap();
        let err = child(
            &manager,
            &ChildAction::Add {
                parent: "createPost".to_string(),
                child: "author".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Core(warden_core::Error::CyclicHierarchy { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_modes() {
        let manager = manager().await;
        manager.assign("author", "alice").await.unwrap();

        let user: serde_json::Value =
            serde_json::from_str(&export(&manager, AssignmentsMode::User("alice")).await.unwrap())
                .unwrap();
        assert_eq!(user["assignments"], serde_json::json!(["author"]));

        let all: serde_json::Value =
            serde_json::from_str(&export(&manager, AssignmentsMode::All).await.unwrap()).unwrap();
        assert_eq!(all["assignments"]["alice"], serde_json::json!(["author"]));
    }

    // ------------------------------------------------------------------------
    // run
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_run_persists_between_invocations() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = WardenConfig::default();
        let files = JsonFileStorage::in_dir(dir.path());
        config.storage.item_file = files.item_file().to_path_buf();
        config.storage.assignment_file = files.assignment_file().to_path_buf();
        config.storage.rule_file = files.rule_file().to_path_buf();

        let add = Command::Item {
            action: ItemAction::Add {
                kind: "role".to_string(),
                name: "admin".to_string(),
                description: None,
                rule: None,
            },
        };
        run(&add, &config, None).await.unwrap();
        let assign = Command::Assign {
            item: "admin".to_string(),
            user: "root".to_string(),
        };
        run(&assign, &config, None).await.unwrap();

        let check = Command::Check {
            user: "root".to_string(),
            item: "admin".to_string(),
            params: None,
        };
        assert_eq!(run(&check, &config, None).await.unwrap(), "root admin: granted");

        let revoke = Command::Revoke {
            item: "admin".to_string(),
            user: "root".to_string(),
        };
        assert_eq!(
            run(&revoke, &config, None).await.unwrap(),
            "Revoked admin from root"
        );
        assert_eq!(run(&check, &config, None).await.unwrap(), "root admin: denied");
    }
}
