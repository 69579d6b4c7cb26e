//! Per-route access rules and their matchers.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use http::request::Parts;
use serde::{Deserialize, Serialize};
use warden_core::{Result, RuleParams};

use crate::User;

/// Role token matching any unauthenticated user.
pub const GUEST_ROLE: &str = "?";

/// Role token matching any authenticated user.
pub const AUTHENTICATED_ROLE: &str = "@";

/// Custom predicate over the request head.
#[derive(Clone)]
pub struct RequestMatcher(Arc<dyn Fn(&Parts) -> bool + Send + Sync>);

impl RequestMatcher {
    /// Wraps `f`.
    pub fn new(f: impl Fn(&Parts) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluates the predicate.
    pub fn matches(&self, parts: &Parts) -> bool {
        (self.0)(parts)
    }
}

impl fmt::Debug for RequestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestMatcher(..)")
    }
}

impl PartialEq for RequestMatcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Derives rule parameters from the request head, e.g. from path segments.
#[derive(Clone)]
pub struct ParamsProvider(Arc<dyn Fn(&Parts) -> RuleParams + Send + Sync>);

impl ParamsProvider {
    /// Wraps `f`.
    pub fn new(f: impl Fn(&Parts) -> RuleParams + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Computes the parameters for one request.
    pub fn params(&self, parts: &Parts) -> RuleParams {
        (self.0)(parts)
    }
}

impl fmt::Debug for ParamsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParamsProvider(..)")
    }
}

impl PartialEq for ParamsProvider {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// What a route requires of its caller.
///
/// A request passes when the caller is a superuser, or when every part of
/// the rule matches and `allow` is set. The request hooks only exist in
/// code; a rule read from configuration carries neither.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRule {
    /// Items or role tokens; any one matching is enough. Empty matches all.
    pub roles: Vec<String>,
    /// Whether a matching request is let through.
    pub allow: bool,
    /// Parameters passed to rule checks.
    pub params: RuleParams,
    /// Client IP patterns; `*` and trailing wildcards like `10.0.*`. Empty
    /// matches all.
    pub ips: Vec<String>,
    /// Extra predicate that must also hold.
    #[serde(skip)]
    pub matcher: Option<RequestMatcher>,
    /// Per-request parameters, used instead of `params` when set.
    #[serde(skip)]
    pub params_provider: Option<ParamsProvider>,
}

impl Default for AccessRule {
    fn default() -> Self {
        Self {
            roles: Vec::new(),
            allow: true,
            params: RuleParams::new(),
            ips: Vec::new(),
            matcher: None,
            params_provider: None,
        }
    }
}

impl AccessRule {
    /// Requires one of `roles`.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the rule parameters.
    pub fn with_params(mut self, params: RuleParams) -> Self {
        self.params = params;
        self
    }

    /// Restricts client IPs.
    pub fn with_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ips = ips.into_iter().map(Into::into).collect();
        self
    }

    /// Requires `f` to accept the request as well.
    pub fn with_matcher(mut self, f: impl Fn(&Parts) -> bool + Send + Sync + 'static) -> Self {
        self.matcher = Some(RequestMatcher::new(f));
        self
    }

    /// Computes rule parameters from each request instead of using `params`.
    pub fn with_params_from(
        mut self,
        f: impl Fn(&Parts) -> RuleParams + Send + Sync + 'static,
    ) -> Self {
        self.params_provider = Some(ParamsProvider::new(f));
        self
    }

    /// Rejects matching requests.
    pub fn deny(mut self) -> Self {
        self.allow = false;
        self
    }

    /// The parameters role checks receive for this request.
    pub fn params_for(&self, parts: &Parts) -> Cow<'_, RuleParams> {
        match &self.params_provider {
            Some(provider) => Cow::Owned(provider.params(parts)),
            None => Cow::Borrowed(&self.params),
        }
    }

    /// Whether `user` calling from `ip` satisfies the rule for the request
    /// described by `parts`. Superuser bypass is the caller's business.
    ///
    /// Role checks run last, only once every cheaper condition holds.
    pub async fn matches(&self, user: &User, ip: &str, parts: &Parts) -> Result<bool> {
        if !self.allow || !match_ip(ip, &self.ips) {
            return Ok(false);
        }
        if self.matcher.as_ref().is_some_and(|m| !m.matches(parts)) {
            return Ok(false);
        }
        match_role(user, &self.roles, &self.params_for(parts)).await
    }
}

/// Whether `user` holds any of `roles`.
pub async fn match_role(user: &User, roles: &[String], params: &RuleParams) -> Result<bool> {
    if roles.is_empty() {
        return Ok(true);
    }
    for role in roles {
        let matched = match role.as_str() {
            GUEST_ROLE => user.is_guest(),
            AUTHENTICATED_ROLE => !user.is_guest(),
            name => user.can(name, params).await?,
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `ip` matches any of `patterns`.
pub fn match_ip(ip: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| {
        if pattern == "*" || pattern == ip {
            return true;
        }
        match pattern.find('*') {
            Some(pos) => ip.get(..pos) == pattern.get(..pos),
            None => false,
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_acl::{Manager, ManagerOptions};
    use warden_core::Item;
    use warden_storage::MemoryStorage;

    use crate::Identity;

    fn parts(uri: &str) -> Parts {
        http::Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn manager() -> Arc<Manager> {
        let manager = Manager::new(Arc::new(MemoryStorage::new()), ManagerOptions::default());
        manager.add(Item::role("editor")).await.unwrap();
        manager.assign("editor", "alice").await.unwrap();
        Arc::new(manager)
    }

    // ------------------------------------------------------------------------
    // match_ip
    // ------------------------------------------------------------------------

    #[test]
    fn test_match_ip_empty_matches_all() {
        assert!(match_ip("1.2.3.4", &[]));
        assert!(match_ip("", &[]));
    }

    #[test]
    fn test_match_ip_exact_and_star() {
        assert!(match_ip("10.0.0.1", &patterns(&["10.0.0.1"])));
        assert!(match_ip("10.0.0.1", &patterns(&["*"])));
        assert!(!match_ip("10.0.0.2", &patterns(&["10.0.0.1"])));
    }

    #[test]
    fn test_match_ip_prefix_wildcard() {
        let rules = patterns(&["192.168.*"]);
        assert!(match_ip("192.168.1.20", &rules));
        assert!(!match_ip("192.169.1.20", &rules));
        assert!(!match_ip("192", &rules));
    }

    // ------------------------------------------------------------------------
    // match_role
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_match_role_tokens() {
        let m = manager().await;
        let guest = User::guest(m.clone());
        let alice = User::authenticated(m, Identity::new("alice"));
        let none = RuleParams::new();

        assert!(match_role(&guest, &patterns(&["?"]), &none).await.unwrap());
        assert!(!match_role(&alice, &patterns(&["?"]), &none).await.unwrap());
        assert!(match_role(&alice, &patterns(&["@"]), &none).await.unwrap());
        assert!(!match_role(&guest, &patterns(&["@"]), &none).await.unwrap());
        assert!(match_role(&guest, &[], &none).await.unwrap());
    }

    #[tokio::test]
    async fn test_match_role_items() {
        let m = manager().await;
        let alice = User::authenticated(m.clone(), Identity::new("alice"));
        let bob = User::authenticated(m, Identity::new("bob"));
        let none = RuleParams::new();
        let roles = patterns(&["?", "editor"]);

        assert!(match_role(&alice, &roles, &none).await.unwrap());
        assert!(!match_role(&bob, &roles, &none).await.unwrap());
    }

    // ------------------------------------------------------------------------
    // AccessRule
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rule_matches() {
        let m = manager().await;
        let alice = User::authenticated(m, Identity::new("alice"));

        let req = parts("/");
        let rule = AccessRule::roles(["editor"]).with_ips(["10.*"]);
        assert!(rule.matches(&alice, "10.1.1.1", &req).await.unwrap());
        assert!(!rule.matches(&alice, "11.1.1.1", &req).await.unwrap());
        assert!(!rule.clone().deny().matches(&alice, "10.1.1.1", &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_rule_matcher_is_anded() {
        let m = manager().await;
        let alice = User::authenticated(m, Identity::new("alice"));
        let rule = AccessRule::roles(["editor"]).with_matcher(|p| p.method == http::Method::GET);

        assert!(rule.matches(&alice, "", &parts("/")).await.unwrap());

        let mut post = parts("/");
        post.method = http::Method::POST;
        assert!(!rule.matches(&alice, "", &post).await.unwrap());
    }

    #[test]
    fn test_params_for_prefers_provider() {
        let mut fixed = RuleParams::new();
        fixed.insert("source".to_string(), serde_json::json!("fixed"));
        let rule = AccessRule::default().with_params(fixed.clone());
        assert_eq!(*rule.params_for(&parts("/posts/alice")), fixed);

        let rule = rule.with_params_from(|p| {
            let mut params = RuleParams::new();
            if let Some(last) = p.uri.path().rsplit('/').next() {
                params.insert("authorId".to_string(), serde_json::json!(last));
            }
            params
        });
        let params = rule.params_for(&parts("/posts/alice"));
        assert_eq!(params["authorId"], "alice");
        assert!(!params.contains_key("source"));
    }

    #[test]
    fn test_hooks_compare_by_identity() {
        let rule = AccessRule::default().with_matcher(|_| true);
        assert_eq!(rule.clone(), rule);
        assert_ne!(rule, AccessRule::default().with_matcher(|_| true));
        assert!(format!("{rule:?}").contains("RequestMatcher(..)"));
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: AccessRule = serde_json::from_str(r#"{"roles":["@"]}"#).unwrap();
        assert!(rule.allow);
        assert!(rule.ips.is_empty());
        assert_eq!(rule.roles, vec!["@".to_string()]);
        assert!(rule.matcher.is_none());
        assert!(rule.params_provider.is_none());
    }
}
