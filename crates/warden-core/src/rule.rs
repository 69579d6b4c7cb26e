//! Pluggable predicates that gate individual items.
//!
//! A rule is an explicit capability: anything implementing [`Rule`] can be
//! registered under a name and referenced by items through `rule_name`.
//! Persisted rules are stored as [`RuleDefinition`]s and turned back into
//! live rules by a factory registered for their `type_name`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Item, Result};

/// Runtime parameters passed to rules during an access check.
pub type RuleParams = serde_json::Map<String, Value>;

/// A named predicate evaluated against runtime parameters.
///
/// `execute` may perform I/O; it must not mutate authorization state.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Unique rule name.
    fn name(&self) -> &str;

    /// Name of the factory that can rebuild this rule from its data.
    fn type_name(&self) -> &str;

    /// Configuration captured at construction.
    fn data(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Evaluates the rule for `username` on `item`.
    async fn execute(&self, username: &str, item: &Item, params: &RuleParams) -> Result<bool>;

    /// Persistable form of this rule.
    fn definition(&self) -> RuleDefinition {
        RuleDefinition {
            name: self.name().to_string(),
            type_name: self.type_name().to_string(),
            data: self.data(),
        }
    }
}

/// Persisted form of a rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Unique rule name.
    pub name: String,
    /// Factory key.
    pub type_name: String,
    /// Opaque configuration payload.
    #[serde(default)]
    pub data: Value,
}

impl RuleDefinition {
    /// Creates a definition.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            data,
        }
    }
}

/// The rule registered when an item references a rule nobody has added yet.
///
/// Always passes.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicRule {
    name: String,
    data: Value,
}

impl BasicRule {
    /// Type name under which basic rules are persisted.
    pub const TYPE_NAME: &'static str = "Rule";

    /// Creates a basic rule with empty data.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Value::Object(serde_json::Map::new()))
    }

    /// Creates a basic rule carrying `data`.
    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[async_trait]
impl Rule for BasicRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn data(&self) -> Value {
        self.data.clone()
    }

    async fn execute(&self, _username: &str, _item: &Item, _params: &RuleParams) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_rule_always_passes() {
        let rule = BasicRule::new("anything");
        let item = Item::permission("readPost");
        assert!(rule.execute("u1", &item, &RuleParams::new()).await.unwrap());
    }

    #[test]
    fn test_basic_rule_definition() {
        let rule = BasicRule::with_data("isAuthor", json!({"reallyReally": true}));
        let def = rule.definition();
        assert_eq!(def.name, "isAuthor");
        assert_eq!(def.type_name, "Rule");
        assert_eq!(def.data["reallyReally"], true);
    }

    #[test]
    fn test_rule_definition_serialization() {
        let def = RuleDefinition::new("action_rule", "ActionRule", json!({"action": "read"}));
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["typeName"], "ActionRule");
        let back: RuleDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, def);
    }
}
