//! Grant resolution over the hierarchy graph.
//!
//! [`AccessChecker::check`] walks from the requested item up through its
//! parents, depth-first in edge insertion order:
//!
//! 1. unknown item: `false` for that node;
//! 2. gating rule: missing rule is an error, a `false` result stops the walk
//!    at this node (its parents are not explored);
//! 3. direct assignment or default role: grant;
//! 4. otherwise continue with the parents.
//!
//! A per-call visited set guards against cycles and doubles as a memo: a node
//! seen twice already failed to grant on its first visit.

use std::collections::HashSet;
use std::time::Duration;

use warden_core::{AssignmentStore, Catalog, Error, Item, Result, Rule, RuleParams};

use crate::rules::RuleRegistry;

/// Read-only view of the stores a check consults.
#[derive(Clone, Copy, Debug)]
pub struct AccessGraph<'a> {
    /// Items and hierarchy.
    pub catalog: &'a Catalog,
    /// Live rules.
    pub rules: &'a RuleRegistry,
    /// Direct grants.
    pub assignments: &'a AssignmentStore,
}

/// Result of evaluating one gating rule.
enum Gate {
    Open,
    Closed,
    TimedOut,
}

/// The grant-resolution algorithm with its construction-time configuration.
#[derive(Clone, Debug, Default)]
pub struct AccessChecker {
    default_roles: HashSet<String>,
    rule_timeout: Option<Duration>,
}

impl AccessChecker {
    /// Creates a checker.
    pub fn new<I, S>(default_roles: I, rule_timeout: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_roles: default_roles.into_iter().map(Into::into).collect(),
            rule_timeout,
        }
    }

    /// Whether `name` is implicitly granted to everyone.
    pub fn is_default_role(&self, name: &str) -> bool {
        self.default_roles.contains(name)
    }

    /// Per-rule execution limit.
    pub fn rule_timeout(&self) -> Option<Duration> {
        self.rule_timeout
    }

    /// Decides whether `username` holds `item_name` under `params`.
    ///
    /// Unknown items resolve to `false`. A missing rule or a failing rule
    /// aborts the check with its error. If nothing grants and some branch
    /// was cut off by the rule timeout, [`Error::Timeout`] is returned.
    pub async fn check(
        &self,
        graph: AccessGraph<'_>,
        username: &str,
        item_name: &str,
        params: &RuleParams,
    ) -> Result<bool> {
        log::debug!("Checking access: user={username} item={item_name}");

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![item_name];
        let mut timed_out = false;

        while let Some(name) = stack.pop() {
            if !visited.insert(name) {
                log::trace!("Already visited {name}; skipping");
                continue;
            }

            let Some(item) = graph.catalog.get(name) else {
                log::trace!("Unknown item {name}");
                continue;
            };

            if let Some(rule_name) = &item.rule_name {
                let rule = graph
                    .rules
                    .resolve(rule_name)
                    .ok_or_else(|| Error::rule_not_found(rule_name))?;
                match self.gate(rule.as_ref(), username, item, params).await? {
                    Gate::Open => {}
                    Gate::Closed => {
                        log::trace!("Rule {rule_name} denied {name}");
                        continue;
                    }
                    Gate::TimedOut => {
                        timed_out = true;
                        continue;
                    }
                }
            }

            if graph.assignments.contains(username, name) || self.is_default_role(name) {
                log::debug!("Access granted: user={username} item={item_name} via={name}");
                return Ok(true);
            }

            // Reversed so the first-inserted parent is popped first.
            for parent in graph.catalog.parents_of(name).iter().rev() {
                stack.push(parent.as_str());
            }
        }

        if timed_out {
            let millis = self.rule_timeout.map_or(0, |d| d.as_millis() as u64);
            log::debug!("Access undecided: user={username} item={item_name} (timeout)");
            return Err(Error::Timeout {
                item: item_name.to_string(),
                millis,
            });
        }

        log::debug!("Access denied: user={username} item={item_name}");
        Ok(false)
    }

    async fn gate(
        &self,
        rule: &dyn Rule,
        username: &str,
        item: &Item,
        params: &RuleParams,
    ) -> Result<Gate> {
        let outcome = match self.rule_timeout {
            None => rule.execute(username, item, params).await?,
            Some(limit) => {
                match tokio::time::timeout(limit, rule.execute(username, item, params)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        log::warn!(
                            "Rule '{}' on '{}' exceeded {limit:?}; treating branch as denied",
                            rule.name(),
                            item.name
                        );
                        return Ok(Gate::TimedOut);
                    }
                }
            }
        };
        Ok(if outcome { Gate::Open } else { Gate::Closed })
    }
}
