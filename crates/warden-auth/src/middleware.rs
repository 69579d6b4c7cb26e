//! Tower access-control middleware.
//!
//! `AccessLayer` guards a service with an [`AccessRule`]. It expects a
//! [`User`] in the request extensions, put there by whatever layer
//! authenticates requests.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::response::IntoResponse;
use http::Request;
use http::request::Parts;
use tower::{Layer, Service};

use crate::{AccessError, AccessRule, User};

/// Tower `Layer` that wraps services with an access rule.
#[derive(Clone, Debug)]
pub struct AccessLayer {
    rule: Arc<AccessRule>,
}

impl AccessLayer {
    /// Create a new access layer enforcing `rule`.
    pub fn new(rule: AccessRule) -> Self {
        Self {
            rule: Arc::new(rule),
        }
    }

    /// The enforced rule.
    pub fn rule(&self) -> &AccessRule {
        &self.rule
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessService {
            inner,
            rule: self.rule.clone(),
        }
    }
}

/// Tower `Service` that evaluates the access rule before forwarding.
#[derive(Clone, Debug)]
pub struct AccessService<S> {
    inner: S,
    rule: Arc<AccessRule>,
}

impl<S> Service<Request<Body>> for AccessService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let rule = self.rule.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let Some(user) = parts.extensions.get::<User>().cloned() else {
                log::error!("Access check without a request user");
                return Ok(error_response(&AccessError::MissingUser));
            };

            if let Err(err) = authorize(&rule, &user, &parts).await {
                if err.is_client_error() {
                    log::debug!(
                        "Access denied for {:?} on {}: {err}",
                        user.username().unwrap_or("<guest>"),
                        parts.uri.path()
                    );
                } else {
                    log::error!("Access check failed on {}: {err}", parts.uri.path());
                }
                return Ok(error_response(&err));
            }

            let req = Request::from_parts(parts, body);
            let resp = inner
                .call(req)
                .await
                .unwrap_or_else(|infallible| match infallible {});
            Ok(resp.into_response())
        })
    }
}

/// Decides a request: inactive accounts are turned away first, superusers
/// pass, everyone else must match the rule.
pub async fn authorize(rule: &AccessRule, user: &User, parts: &Parts) -> Result<(), AccessError> {
    if !user.is_guest() && !user.is_active() {
        return Err(AccessError::Inactive);
    }
    if user.is_superuser() || rule.matches(user, &client_ip(parts), parts).await? {
        Ok(())
    } else {
        Err(AccessError::Unauthorized)
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address when the server was started with connect info. Empty if
/// none is known.
pub fn client_ip(parts: &Parts) -> String {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default()
}

/// JSON error body with the status for `err`.
fn error_response(err: &AccessError) -> axum::response::Response {
    let category = if err.is_client_error() {
        "authorization"
    } else {
        "internal"
    };
    let body = serde_json::json!({
        "error": {
            "category": category,
            "message": err.to_string(),
        }
    });

    (
        err.status_code(),
        [(http::header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&body).unwrap_or_default(),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Identity;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use warden_acl::{AuthObject, Manager, ManagerOptions};
    use warden_core::{Item, Rule, RuleParams};
    use warden_storage::MemoryStorage;

    /// Mock inner service that counts calls.
    #[derive(Clone, Default)]
    struct MockService {
        calls: Arc<AtomicUsize>,
    }

    impl Service<Request<Body>> for MockService {
        type Response = axum::response::Response;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            let calls = self.calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((StatusCode::OK, "ok").into_response())
            })
        }
    }

    async fn manager() -> Arc<Manager> {
        let manager = Manager::new(Arc::new(MemoryStorage::new()), ManagerOptions::default());
        manager.add(Item::role("admin")).await.unwrap();
        manager.add(Item::permission("manageUsers")).await.unwrap();
        manager.add_child("admin", "manageUsers").await.unwrap();
        manager.assign("admin", "alice").await.unwrap();
        Arc::new(manager)
    }

    fn request_to(method: http::Method, uri: &str, user: Option<User>) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "10.0.0.7, 172.16.0.1")
            .body(Body::empty())
            .unwrap();
        if let Some(user) = user {
            req.extensions_mut().insert(user);
        }
        req
    }

    async fn send(rule: AccessRule, req: Request<Body>) -> (StatusCode, usize) {
        let mock = MockService::default();
        let calls = mock.calls.clone();
        let service = AccessLayer::new(rule).layer(mock);
        let resp = service.oneshot(req).await.unwrap();
        (resp.status(), calls.load(Ordering::SeqCst))
    }

    async fn status(rule: AccessRule, user: Option<User>) -> (StatusCode, usize) {
        send(rule, request_to(http::Method::GET, "/admin", user)).await
    }

    // ------------------------------------------------------------------------
    // client_ip
    // ------------------------------------------------------------------------

    fn head(builder: http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_client_ip_sources() {
        let parts = head(Request::builder().header("x-forwarded-for", " 1.2.3.4 , 5.6.7.8"));
        assert_eq!(client_ip(&parts), "1.2.3.4");

        let parts = head(Request::builder().header("x-real-ip", "9.9.9.9"));
        assert_eq!(client_ip(&parts), "9.9.9.9");

        let mut parts = head(Request::builder());
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080))));
        assert_eq!(client_ip(&parts), "127.0.0.1");

        assert_eq!(client_ip(&head(Request::builder())), "");
    }

    // ------------------------------------------------------------------------
    // Layer behavior
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_missing_user_is_server_error() {
        let (status, calls) = status(AccessRule::default(), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_granted_passes_through() {
        let user = User::authenticated(manager().await, Identity::new("alice"));
        let (status, calls) = status(AccessRule::roles(["manageUsers"]), Some(user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_not_granted_is_unauthorized() {
        let user = User::authenticated(manager().await, Identity::new("bob"));
        let (status, calls) = status(AccessRule::roles(["manageUsers"]), Some(user)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_inactive_user_rejected_before_rule() {
        let user = User::authenticated(manager().await, Identity::new("alice").inactive());
        let (status, _) = status(AccessRule::default(), Some(user.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let err = authorize(&AccessRule::default(), &user, &head(Request::builder()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Inactive));
    }

    #[tokio::test]
    async fn test_superuser_bypasses_rule() {
        let user = User::authenticated(manager().await, Identity::new("root").superuser());
        let rule = AccessRule::roles(["manageUsers"]).with_ips(["192.168.*"]).deny();
        let (status, calls) = status(rule, Some(user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_ip_restriction() {
        let m = manager().await;
        let allowed = AccessRule::roles(["@"]).with_ips(["10.0.*"]);
        let blocked = AccessRule::roles(["@"]).with_ips(["192.168.*"]);

        let user = User::authenticated(m.clone(), Identity::new("alice"));
        assert_eq!(status(allowed, Some(user.clone())).await.0, StatusCode::OK);
        assert_eq!(status(blocked, Some(user)).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guest_token() {
        let m = manager().await;
        let guest = User::guest(m.clone());
        assert_eq!(
            status(AccessRule::roles(["?"]), Some(guest.clone())).await.0,
            StatusCode::OK
        );
        assert_eq!(
            status(AccessRule::roles(["@"]), Some(guest)).await.0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_deny_rule_rejects_match() {
        let user = User::authenticated(manager().await, Identity::new("alice"));
        let (status, _) = status(AccessRule::roles(["@"]).deny(), Some(user)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    struct FailingRule;

    #[async_trait::async_trait]
    impl Rule for FailingRule {
        fn name(&self) -> &str {
            "broken"
        }

        fn type_name(&self) -> &str {
            "FailingRule"
        }

        async fn execute(&self, _: &str, _: &Item, _: &RuleParams) -> warden_core::Result<bool> {
            Err(warden_core::Error::storage("backend unavailable"))
        }
    }

    #[tokio::test]
    async fn test_engine_error_is_server_error() {
        let m = manager().await;
        m.add(AuthObject::rule(FailingRule)).await.unwrap();
        m.add(Item::permission("gated").with_rule("broken"))
            .await
            .unwrap();
        m.assign("gated", "alice").await.unwrap();

        let user = User::authenticated(m, Identity::new("alice"));
        let (status, calls) = status(AccessRule::roles(["gated"]), Some(user)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls, 0);
    }

    // ------------------------------------------------------------------------
    // Request hooks
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_matcher_is_required_alongside_roles() {
        let m = manager().await;
        let rule = AccessRule::roles(["manageUsers"])
            .with_matcher(|parts| parts.method == http::Method::GET);

        let get = request_to(
            http::Method::GET,
            "/admin",
            Some(User::authenticated(m.clone(), Identity::new("alice"))),
        );
        assert_eq!(send(rule.clone(), get).await, (StatusCode::OK, 1));

        let delete = request_to(
            http::Method::DELETE,
            "/admin",
            Some(User::authenticated(m, Identity::new("alice"))),
        );
        assert_eq!(send(rule, delete).await, (StatusCode::UNAUTHORIZED, 0));
    }

    /// Grants when `authorId` names the caller.
    struct OwnerRule;

    #[async_trait::async_trait]
    impl Rule for OwnerRule {
        fn name(&self) -> &str {
            "isOwner"
        }

        fn type_name(&self) -> &str {
            "OwnerRule"
        }

        async fn execute(
            &self,
            username: &str,
            _: &Item,
            params: &RuleParams,
        ) -> warden_core::Result<bool> {
            Ok(params.get("authorId").and_then(|v| v.as_str()) == Some(username))
        }
    }

    #[tokio::test]
    async fn test_params_come_from_request_path() {
        let m = manager().await;
        m.add(AuthObject::rule(OwnerRule)).await.unwrap();
        m.add(Item::permission("updatePost")).await.unwrap();
        m.add(Item::permission("updateOwnPost").with_rule("isOwner"))
            .await
            .unwrap();
        m.add(Item::role("author")).await.unwrap();
        m.add_child("updateOwnPost", "updatePost").await.unwrap();
        m.add_child("author", "updateOwnPost").await.unwrap();
        m.assign("author", "carol").await.unwrap();

        let rule = AccessRule::roles(["updatePost"]).with_params_from(|parts| {
            let mut params = RuleParams::new();
            if let Some(author) = parts.uri.path().strip_prefix("/posts/") {
                params.insert("authorId".to_string(), serde_json::json!(author));
            }
            params
        });

        let user = User::authenticated(m, Identity::new("carol"));
        let own = request_to(http::Method::PUT, "/posts/carol", Some(user.clone()));
        assert_eq!(send(rule.clone(), own).await, (StatusCode::OK, 1));

        let other = request_to(http::Method::PUT, "/posts/dave", Some(user));
        assert_eq!(send(rule, other).await, (StatusCode::UNAUTHORIZED, 0));
    }
}
