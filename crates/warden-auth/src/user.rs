//! Request identity.
//!
//! A [`User`] is either a guest or an authenticated [`Identity`]. An upstream
//! layer (whatever authenticates the request) inserts it into the request
//! extensions; [`AccessLayer`](crate::AccessLayer) and handlers read it back
//! with [`user_from_parts`] or [`user_from_request`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use warden_acl::Manager;
use warden_core::{Result, RuleParams};

/// An authenticated account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Username passed to access checks.
    pub username: String,
    /// Disabled accounts are rejected before any check.
    pub is_active: bool,
    /// Superusers bypass access rules.
    pub is_superuser: bool,
}

impl Identity {
    /// An active, non-superuser identity.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_active: true,
            is_superuser: false,
        }
    }

    /// Marks the identity as a superuser.
    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    /// Marks the identity as inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// The caller of a request, bound to the engine that answers its checks.
///
/// Clones share the permission cache.
#[derive(Clone)]
pub struct User {
    manager: Arc<Manager>,
    identity: Option<Identity>,
    cache: Arc<Mutex<HashMap<String, bool>>>,
}

impl User {
    /// A user with an optional identity; `None` is a guest.
    pub fn new(manager: Arc<Manager>, identity: Option<Identity>) -> Self {
        Self {
            manager,
            identity,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// An unauthenticated user.
    pub fn guest(manager: Arc<Manager>) -> Self {
        Self::new(manager, None)
    }

    /// An authenticated user.
    pub fn authenticated(manager: Arc<Manager>, identity: Identity) -> Self {
        Self::new(manager, Some(identity))
    }

    /// The identity, if authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The username, if authenticated.
    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }

    /// Whether the user is unauthenticated.
    pub fn is_guest(&self) -> bool {
        self.identity.is_none()
    }

    /// Guests count as active.
    pub fn is_active(&self) -> bool {
        self.identity.as_ref().is_none_or(|i| i.is_active)
    }

    /// Whether the user bypasses access rules.
    pub fn is_superuser(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.is_superuser)
    }

    /// The engine this user checks against.
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// Checks `permission` for this user. Guests check as the empty username.
    ///
    /// Results of parameterless checks are cached for the life of the user.
    pub async fn can(&self, permission: &str, params: &RuleParams) -> Result<bool> {
        let cacheable = params.is_empty();
        if cacheable {
            if let Some(hit) = self.cached(permission) {
                return Ok(hit);
            }
        }

        let access = self.can_uncached(permission, params).await?;

        if cacheable {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(permission.to_string(), access);
            }
        }
        Ok(access)
    }

    /// Like [`can`](Self::can), but always asks the engine and leaves the
    /// cache alone.
    pub async fn can_uncached(&self, permission: &str, params: &RuleParams) -> Result<bool> {
        let username = self.username().unwrap_or_default();
        self.manager
            .check_access(username, permission, params)
            .await
    }

    fn cached(&self, permission: &str) -> Option<bool> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(permission).copied())
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Extract the [`User`] from HTTP request `Parts`, if present.
pub fn user_from_parts(parts: &http::request::Parts) -> Option<&User> {
    parts.extensions.get::<User>()
}

/// Extract the [`User`] from a request, if present.
pub fn user_from_request<B>(req: &http::Request<B>) -> Option<&User> {
    req.extensions().get::<User>()
}
