//! Introspection server.
//!
//! Serves the authorization graph at a single `GET` route. Callers see every
//! item and rule plus their own assignments; superusers may ask for
//! everyone's with `?assignments=all`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, Request, State};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use warden_acl::{AssignmentsMode, Manager, Snapshot};
use warden_auth::{HeaderIdentity, IdentityLayer, user_from_request};

use crate::{Error, Result};

/// Route served when none is configured.
pub const DEFAULT_PATH: &str = "/rbac";

/// Where and how the server listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Route path.
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Query string of the introspection route.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// `all` for the admin view.
    pub assignments: Option<String>,
}

impl SnapshotQuery {
    fn wants_all(&self) -> bool {
        self.assignments.as_deref() == Some("all")
    }
}

/// Warden introspection server
pub struct Server {
    manager: Arc<Manager>,
    config: ServerConfig,
    identity: HeaderIdentity,
}

impl Server {
    /// Create a server over `manager`.
    pub fn new(manager: Arc<Manager>, config: ServerConfig) -> Self {
        Self {
            manager,
            config,
            identity: HeaderIdentity::default(),
        }
    }

    /// Use `identity` to resolve callers.
    pub fn with_identity(mut self, identity: HeaderIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The bare route. Expects a [`User`](warden_auth::User) in the request
    /// extensions.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.path, get(snapshot_handler))
            .with_state(self.manager.clone())
    }

    /// The route with identity resolution in front.
    pub fn app(&self) -> Router {
        self.router().layer(IdentityLayer::new(
            Arc::new(self.identity.clone()),
            self.manager.clone(),
        ))
    }

    /// Binds and serves until the process stops.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind {
                addr: addr.clone(),
                source,
            })?;

        log::info!("Serving {} on {}", self.config.path, addr);

        axum::serve(
            listener,
            self.app()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(Error::Serve)
    }
}

async fn snapshot_handler(
    State(manager): State<Arc<Manager>>,
    Query(query): Query<SnapshotQuery>,
    req: Request,
) -> Result<axum::Json<Snapshot>> {
    let user = user_from_request(&req)
        .cloned()
        .ok_or(Error::Unauthorized)?;
    let username = match user.username() {
        Some(name) if user.is_active() => name.to_string(),
        _ => return Err(Error::Unauthorized),
    };

    let mode = if query.wants_all() {
        if !user.is_superuser() {
            return Err(Error::Forbidden);
        }
        AssignmentsMode::All
    } else {
        AssignmentsMode::User(&username)
    };

    log::debug!("Snapshot for {username} ({mode:?})");
    Ok(axum::Json(manager.snapshot(mode).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use http::StatusCode;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use warden_acl::ManagerOptions;
    use warden_core::Item;
    use warden_storage::MemoryStorage;

    async fn server(config: ServerConfig) -> Server {
        let manager = Manager::new(Arc::new(MemoryStorage::new()), ManagerOptions::default());
        manager.add(Item::role("author")).await.unwrap();
        manager.add(Item::permission("createPost")).await.unwrap();
        manager.add_child("author", "createPost").await.unwrap();
        manager.assign("author", "alice").await.unwrap();
        manager.assign("createPost", "bob").await.unwrap();
        Server::new(Arc::new(manager), config)
            .with_identity(HeaderIdentity::default().with_superusers(["root"]))
    }

    async fn get(server: &Server, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-remote-user", user);
        }
        let resp = server
            .app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.path, "/rbac");
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_user_view() {
        let server = server(ServerConfig::default()).await;
        let (status, body) = get(&server, "/rbac", Some("alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assignments"], json!(["author"]));
        assert_eq!(body["items"]["author"]["children"], json!(["createPost"]));
        assert_eq!(body["rules"], json!({}));
    }

    #[tokio::test]
    async fn test_guest_is_unauthorized() {
        let server = server(ServerConfig::default()).await;
        let (status, _) = get(&server, "/rbac", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_identity_layer_is_unauthorized() {
        let server = server(ServerConfig::default()).await;
        let resp = server
            .router()
            .oneshot(
                http::Request::builder()
                    .uri("/rbac")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_view_requires_superuser() {
        let server = server(ServerConfig::default()).await;
        let (status, _) = get(&server, "/rbac?assignments=all", Some("alice")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = get(&server, "/rbac?assignments=all", Some("root")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["assignments"],
            json!({"alice": ["author"], "bob": ["createPost"]})
        );
    }

    #[tokio::test]
    async fn test_custom_path() {
        let config = ServerConfig {
            path: "/auth/graph".to_string(),
            ..ServerConfig::default()
        };
        let server = server(config).await;
        assert_eq!(get(&server, "/auth/graph", Some("bob")).await.0, StatusCode::OK);
        assert_eq!(get(&server, "/rbac", Some("bob")).await.0, StatusCode::NOT_FOUND);
    }
}
