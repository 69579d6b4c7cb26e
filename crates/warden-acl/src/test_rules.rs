//! Rules used across this crate's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use warden_core::{Item, Result, Rule, RuleParams};

/// Passes when `params.authorId` equals the username.
pub struct AuthorRule {
    name: String,
}

impl AuthorRule {
    pub const TYPE_NAME: &'static str = "AuthorRule";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Rule for AuthorRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    async fn execute(&self, username: &str, _item: &Item, params: &RuleParams) -> Result<bool> {
        Ok(params.get("authorId").and_then(Value::as_str) == Some(username))
    }
}

/// Passes when its configured action is `"all"` or matches `params.action`.
pub struct ActionRule {
    name: String,
    action: String,
}

impl ActionRule {
    pub const TYPE_NAME: &'static str = "ActionRule";

    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
        }
    }

    pub fn from_data(name: &str, data: &Value) -> Self {
        let action = data.get("action").and_then(Value::as_str).unwrap_or("read");
        Self::new(name, action)
    }
}

#[async_trait]
impl Rule for ActionRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn data(&self) -> Value {
        json!({ "action": self.action })
    }

    async fn execute(&self, _username: &str, _item: &Item, params: &RuleParams) -> Result<bool> {
        let requested = params.get("action").and_then(Value::as_str);
        Ok(self.action == "all" || requested == Some(self.action.as_str()))
    }
}

/// Returns a fixed answer and counts its invocations.
pub struct CountingRule {
    name: String,
    answer: bool,
    pub calls: AtomicUsize,
}

impl CountingRule {
    pub fn new(name: impl Into<String>, answer: bool) -> Self {
        Self {
            name: name.into(),
            answer,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Rule for CountingRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "CountingRule"
    }

    async fn execute(&self, _username: &str, _item: &Item, _params: &RuleParams) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

/// Sleeps before passing.
pub struct SlowRule {
    name: String,
    delay: Duration,
}

impl SlowRule {
    pub fn new(name: impl Into<String>, millis: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(millis),
        }
    }
}

#[async_trait]
impl Rule for SlowRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "SlowRule"
    }

    async fn execute(&self, _username: &str, _item: &Item, _params: &RuleParams) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }
}
