//! Rule registry and rule-type factories.
//!
//! The [`RuleRegistry`] holds live rules by name. [`RuleTypes`] turns
//! persisted [`RuleDefinition`]s back into live rules: each `type_name`
//! maps to a factory registered at startup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use warden_core::{BasicRule, Error, Item, Result, Rule, RuleDefinition, RuleParams};

// ============================================================================
// RuleRegistry
// ============================================================================

/// Live rules keyed by name.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn Rule>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule under its own name.
    pub fn register(&mut self, rule: Arc<dyn Rule>) -> Result<()> {
        let name = rule.name().to_string();
        if self.rules.contains_key(&name) {
            return Err(Error::duplicate_rule(name));
        }
        self.rules.insert(name, rule);
        Ok(())
    }

    /// Replaces the rule stored under `name` (which may differ from the new
    /// rule's name).
    pub fn replace(&mut self, name: &str, rule: Arc<dyn Rule>) -> Result<()> {
        if !self.rules.contains_key(name) {
            return Err(Error::rule_not_found(name));
        }
        if rule.name() != name && self.rules.contains_key(rule.name()) {
            return Err(Error::duplicate_rule(rule.name()));
        }
        self.rules.remove(name);
        self.rules.insert(rule.name().to_string(), rule);
        Ok(())
    }

    /// Looks up a rule.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.get(name).cloned()
    }

    /// Whether a rule is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Unregisters a rule.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.remove(name)
    }

    /// Unregisters every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// All rules in name order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.values()
    }

    /// Persistable definitions of every rule.
    pub fn definitions(&self) -> impl Iterator<Item = RuleDefinition> + '_ {
        self.rules.values().map(|rule| rule.definition())
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.rules.keys()).finish()
    }
}

// ============================================================================
// RuleTypes
// ============================================================================

/// Builds a live rule from its name and persisted data.
pub type RuleFactory = Arc<dyn Fn(&str, Value) -> Result<Arc<dyn Rule>> + Send + Sync>;

/// Factories keyed by rule type name.
///
/// `"Rule"` is always present and builds a [`BasicRule`].
#[derive(Clone)]
pub struct RuleTypes {
    factories: HashMap<String, RuleFactory>,
}

impl RuleTypes {
    /// Creates a table holding only the basic rule factory.
    pub fn new() -> Self {
        let mut types = Self {
            factories: HashMap::new(),
        };
        types.register(BasicRule::TYPE_NAME, |name, data| {
            Ok(Arc::new(BasicRule::with_data(name, data)))
        });
        types
    }

    /// Registers (or replaces) the factory for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&str, Value) -> Result<Arc<dyn Rule>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str, Value) -> Result<Arc<dyn Rule>> + Send + Sync + 'static,
    {
        self.register(type_name, factory);
        self
    }

    /// Whether a factory exists for `type_name`.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Builds a live rule from a definition.
    ///
    /// Definitions with no registered factory become [`UnboundRule`]s.
    pub fn instantiate(&self, definition: &RuleDefinition) -> Result<Arc<dyn Rule>> {
        match self.factories.get(&definition.type_name) {
            Some(factory) => factory(&definition.name, definition.data.clone()),
            None => {
                log::warn!(
                    "No factory for rule type '{}'; rule '{}' will fail when executed",
                    definition.type_name,
                    definition.name
                );
                Ok(Arc::new(UnboundRule::new(definition.clone())))
            }
        }
    }
}

impl Default for RuleTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RuleTypes").field("types", &names).finish()
    }
}

// ============================================================================
// UnboundRule
// ============================================================================

/// A persisted rule whose type has no factory.
///
/// Keeps its definition so exports round-trip; executing it raises
/// [`Error::RuleTypeNotRegistered`].
#[derive(Clone, Debug, PartialEq)]
pub struct UnboundRule {
    definition: RuleDefinition,
}

impl UnboundRule {
    /// Wraps a definition.
    pub fn new(definition: RuleDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl Rule for UnboundRule {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn type_name(&self) -> &str {
        &self.definition.type_name
    }

    fn data(&self) -> Value {
        self.definition.data.clone()
    }

    async fn execute(&self, _username: &str, _item: &Item, _params: &RuleParams) -> Result<bool> {
        Err(Error::RuleTypeNotRegistered {
            name: self.definition.name.clone(),
            type_name: self.definition.type_name.clone(),
        })
    }
}
