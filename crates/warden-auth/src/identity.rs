//! Identity resolution middleware.
//!
//! `IdentityLayer` turns each request into a [`User`] and stores it in the
//! request extensions for [`AccessLayer`](crate::AccessLayer) and handlers.
//! It is generic over [`IdentityResolver`]; plug in any authentication
//! scheme. [`HeaderIdentity`] trusts a header set by a fronting proxy.

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use http::Request;
use http::request::Parts;
use tower::{Layer, Service};
use warden_acl::Manager;

use crate::{Identity, User};

/// Default header read by [`HeaderIdentity`].
pub const DEFAULT_USER_HEADER: &str = "x-remote-user";

/// Works out who is calling.
pub trait IdentityResolver: Send + Sync + 'static {
    /// The caller's identity, or `None` for a guest.
    fn resolve<'a>(
        &'a self,
        parts: &'a Parts,
    ) -> Pin<Box<dyn Future<Output = Option<Identity>> + Send + 'a>>;
}

/// Reads the username from a trusted request header.
#[derive(Clone, Debug)]
pub struct HeaderIdentity {
    header: String,
    superusers: HashSet<String>,
}

impl HeaderIdentity {
    /// Reads `header`.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            superusers: HashSet::new(),
        }
    }

    /// Marks these usernames as superusers.
    pub fn with_superusers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.superusers = names.into_iter().map(Into::into).collect();
        self
    }

    /// The header name.
    pub fn header(&self) -> &str {
        &self.header
    }

    fn identity(&self, parts: &Parts) -> Option<Identity> {
        let username = parts
            .headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())?;

        let identity = Identity::new(username);
        if self.superusers.contains(username) {
            Some(identity.superuser())
        } else {
            Some(identity)
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_USER_HEADER)
    }
}

impl IdentityResolver for HeaderIdentity {
    fn resolve<'a>(
        &'a self,
        parts: &'a Parts,
    ) -> Pin<Box<dyn Future<Output = Option<Identity>> + Send + 'a>> {
        let identity = self.identity(parts);
        Box::pin(async move { identity })
    }
}

/// Tower `Layer` that attaches a [`User`] to every request.
pub struct IdentityLayer<R: IdentityResolver> {
    resolver: Arc<R>,
    manager: Arc<Manager>,
}

impl<R: IdentityResolver> IdentityLayer<R> {
    /// Create a new identity layer.
    pub fn new(resolver: Arc<R>, manager: Arc<Manager>) -> Self {
        Self { resolver, manager }
    }
}

impl<R: IdentityResolver> Clone for IdentityLayer<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<R: IdentityResolver, S> Layer<S> for IdentityLayer<R> {
    type Service = IdentityService<R, S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            resolver: self.resolver.clone(),
            manager: self.manager.clone(),
        }
    }
}

/// Tower `Service` that resolves the caller before forwarding.
pub struct IdentityService<R: IdentityResolver, S> {
    inner: S,
    resolver: Arc<R>,
    manager: Arc<Manager>,
}

impl<R: IdentityResolver, S: Clone> Clone for IdentityService<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resolver: self.resolver.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<R, S> Service<Request<Body>> for IdentityService<R, S>
where
    R: IdentityResolver,
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

        let resolver = self.resolver.clone();
        let manager = self.manager.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let identity = resolver.resolve(&parts).await;
            log::trace!(
                "Resolved {} as {:?}",
                parts.uri.path(),
                identity.as_ref().map(|i| i.username.as_str())
            );
            parts.extensions.insert(User::new(manager, identity));

            let resp = inner
                .call(Request::from_parts(parts, body))
                .await
                .unwrap_or_else(|infallible| match infallible {});
            Ok(resp.into_response())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use warden_acl::ManagerOptions;
    use warden_storage::MemoryStorage;

    /// Mock inner service that captures the request identity.
    #[derive(Clone, Default)]
    struct MockService {
        captured: Arc<Mutex<Option<Option<Identity>>>>,
    }

    impl Service<Request<Body>> for MockService {
        type Response = axum::response::Response;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let captured = self.captured.clone();
            Box::pin(async move {
                let identity = req
                    .extensions()
                    .get::<User>()
                    .map(|u| u.identity().cloned());
                *captured.lock().unwrap() = identity;
                Ok((StatusCode::OK, "ok").into_response())
            })
        }
    }

    async fn resolve(resolver: HeaderIdentity, header: Option<(&str, &str)>) -> Option<Identity> {
        let manager = Arc::new(Manager::new(
            Arc::new(MemoryStorage::new()),
            ManagerOptions::default(),
        ));
        let mock = MockService::default();
        let captured = mock.captured.clone();
        let service = IdentityLayer::new(Arc::new(resolver), manager).layer(mock);

        let mut builder = Request::builder();
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let resp = service
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let captured = captured.lock().unwrap().clone();
        captured.unwrap()
    }

    #[tokio::test]
    async fn test_header_identity() {
        let identity = resolve(HeaderIdentity::default(), Some(("x-remote-user", "alice"))).await;
        assert_eq!(identity, Some(Identity::new("alice")));
    }

    #[tokio::test]
    async fn test_missing_header_is_guest() {
        assert_eq!(resolve(HeaderIdentity::default(), None).await, None);
        assert_eq!(
            resolve(HeaderIdentity::default(), Some(("x-remote-user", "  "))).await,
            None
        );
    }

    #[tokio::test]
    async fn test_superusers_and_custom_header() {
        let resolver = HeaderIdentity::new("x-user").with_superusers(["root"]);
        assert_eq!(resolver.header(), "x-user");
        let identity = resolve(resolver, Some(("x-user", "root"))).await.unwrap();
        assert!(identity.is_superuser);
    }
}
