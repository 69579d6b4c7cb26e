//! Request identity and access-control middleware for Warden.
//!
//! Provides:
//! - [`User`] / [`Identity`]: the caller of a request, with cached checks
//! - [`IdentityLayer`]: Tower middleware attaching a [`User`] to each request,
//!   parameterised over [`IdentityResolver`]
//! - [`AccessLayer`] / [`AccessService`]: Tower middleware gating a route by
//!   an [`AccessRule`], optionally with a request predicate and request-derived
//!   rule parameters
//! - [`AccessError`]: why a request was turned away
//!
//! Layers run outermost first, so add the access layer before the identity
//! layer:
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/admin", get(handler))
//!     .layer(AccessLayer::new(AccessRule::roles(["admin"])))
//!     .layer(IdentityLayer::new(Arc::new(HeaderIdentity::default()), manager));
//! ```

mod error;
mod identity;
mod middleware;
mod rule;
mod user;

pub use error::AccessError;
pub use identity::{
    DEFAULT_USER_HEADER, HeaderIdentity, IdentityLayer, IdentityResolver, IdentityService,
};
pub use middleware::{AccessLayer, AccessService, authorize, client_ip};
pub use rule::{
    AUTHENTICATED_ROLE, AccessRule, GUEST_ROLE, ParamsProvider, RequestMatcher, match_ip,
    match_role,
};
pub use user::{Identity, User, user_from_parts, user_from_request};
