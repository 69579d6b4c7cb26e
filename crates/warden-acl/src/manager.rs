//! The management facade.
//!
//! [`Manager`] owns the in-memory stores behind a single read/write lock and
//! delegates persistence to an injected [`Storage`]. State is loaded from
//! storage on first use; the load runs under the write lock so concurrent
//! cold callers trigger exactly one load.
//!
//! Every mutation takes the write lock, validates against the in-memory
//! state, persists, and only then applies the change in memory. A failed
//! validation or storage call leaves both sides untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use warden_core::records;
use warden_core::{
    Assignment, AssignmentStore, AuthData, BasicRule, Catalog, ClearScope, Error, Item, ItemKind,
    Result, Rule, RuleParams, Storage,
};

use crate::checker::{AccessChecker, AccessGraph};
use crate::rules::{RuleRegistry, RuleTypes};
use crate::snapshot::{AssignmentsMode, AssignmentsView, Snapshot};

// ============================================================================
// Options
// ============================================================================

/// Engine configuration captured at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Items implicitly granted to every user.
    pub default_roles: Vec<String>,
    /// Limit on a single rule execution; `None` waits indefinitely.
    pub rule_timeout: Option<Duration>,
}

impl ManagerOptions {
    /// Sets the default roles.
    pub fn with_default_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-rule timeout.
    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// AuthObject
// ============================================================================

/// Anything the facade's `add`/`update`/`remove` accept.
#[derive(Clone)]
pub enum AuthObject {
    /// A role or permission.
    Item(Item),
    /// A live rule.
    Rule(Arc<dyn Rule>),
}

impl AuthObject {
    /// Wraps a concrete rule.
    pub fn rule<R: Rule + 'static>(rule: R) -> Self {
        Self::Rule(Arc::new(rule))
    }

    /// Name of the wrapped object.
    pub fn name(&self) -> &str {
        match self {
            Self::Item(item) => &item.name,
            Self::Rule(rule) => rule.name(),
        }
    }
}

impl From<Item> for AuthObject {
    fn from(item: Item) -> Self {
        Self::Item(item)
    }
}

impl From<Arc<dyn Rule>> for AuthObject {
    fn from(rule: Arc<dyn Rule>) -> Self {
        Self::Rule(rule)
    }
}

impl fmt::Debug for AuthObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(item) => f.debug_tuple("Item").field(item).finish(),
            Self::Rule(rule) => f.debug_tuple("Rule").field(&rule.definition()).finish(),
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Default)]
struct State {
    loaded: bool,
    catalog: Catalog,
    rules: RuleRegistry,
    assignments: AssignmentStore,
}

impl State {
    fn graph(&self) -> AccessGraph<'_> {
        AccessGraph {
            catalog: &self.catalog,
            rules: &self.rules,
            assignments: &self.assignments,
        }
    }

    fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::All => {
                self.catalog.clear();
                self.rules.clear();
                self.assignments.clear();
            }
            ClearScope::Roles => self.remove_kind(ItemKind::Role),
            ClearScope::Permissions => self.remove_kind(ItemKind::Permission),
            ClearScope::Rules => {
                let names: Vec<String> = self.rules.names().map(str::to_string).collect();
                for name in names {
                    self.rules.remove(&name);
                    self.catalog.repoint_rule(&name, None);
                }
            }
            ClearScope::Assignments => self.assignments.clear(),
        }
    }

    fn remove_kind(&mut self, kind: ItemKind) {
        for name in self.catalog.remove_kind(kind) {
            self.assignments.remove_item(&name);
        }
    }
}

/// Hierarchical RBAC engine over a pluggable storage backend.
pub struct Manager {
    storage: Arc<dyn Storage>,
    options: ManagerOptions,
    checker: AccessChecker,
    rule_types: RuleTypes,
    state: RwLock<State>,
}

impl Manager {
    /// Creates a manager; nothing is loaded until the first call.
    pub fn new(storage: Arc<dyn Storage>, options: ManagerOptions) -> Self {
        let checker = AccessChecker::new(options.default_roles.iter().cloned(), options.rule_timeout);
        Self {
            storage,
            options,
            checker,
            rule_types: RuleTypes::new(),
            state: RwLock::new(State::default()),
        }
    }

    /// Replaces the rule-type table used when loading persisted rules.
    pub fn with_rule_types(mut self, rule_types: RuleTypes) -> Self {
        self.rule_types = rule_types;
        self
    }

    /// Construction-time options.
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Configured default roles.
    pub fn default_roles(&self) -> &[String] {
        &self.options.default_roles
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    async fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        {
            let state = self.state.read().await;
            if state.loaded {
                return Ok(state);
            }
        }
        let mut state = self.state.write().await;
        if !state.loaded {
            self.load_into(&mut state).await?;
        }
        Ok(state.downgrade())
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let mut state = self.state.write().await;
        if !state.loaded {
            self.load_into(&mut state).await?;
        }
        Ok(state)
    }

    async fn load_into(&self, state: &mut State) -> Result<()> {
        log::info!("Loading authorization data");
        let AuthData {
            catalog,
            rules: definitions,
            assignments,
        } = self.storage.load().await?;

        let mut rules = RuleRegistry::new();
        for definition in definitions.values() {
            rules.register(self.rule_types.instantiate(definition)?)?;
        }

        log::info!(
            "Loaded {} items, {} rules, {} users with assignments",
            catalog.len(),
            rules.len(),
            assignments.usernames().count()
        );
        *state = State {
            loaded: true,
            catalog,
            rules,
            assignments,
        };
        Ok(())
    }

    /// Drops the in-memory state; the next call reloads from storage.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
        log::info!("Authorization state invalidated");
    }

    // ------------------------------------------------------------------------
    // Access checks
    // ------------------------------------------------------------------------

    /// Decides whether `username` holds `item_name` under `params`.
    pub async fn check_access(
        &self,
        username: &str,
        item_name: &str,
        params: &RuleParams,
    ) -> Result<bool> {
        let state = self.read().await?;
        self.checker
            .check(state.graph(), username, item_name, params)
            .await
    }

    // ------------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------------

    /// A new role, not yet added.
    pub fn create_role(&self, name: impl Into<String>) -> Item {
        Item::role(name)
    }

    /// A new permission, not yet added.
    pub fn create_permission(&self, name: impl Into<String>) -> Item {
        Item::permission(name)
    }

    // ------------------------------------------------------------------------
    // Items and rules
    // ------------------------------------------------------------------------

    /// Adds an item or rule.
    ///
    /// An item whose `rule_name` is unknown registers a [`BasicRule`] under
    /// that name first.
    pub async fn add(&self, object: impl Into<AuthObject>) -> Result<()> {
        let mut state = self.write().await?;
        match object.into() {
            AuthObject::Item(item) => self.add_item(&mut state, item).await,
            AuthObject::Rule(rule) => self.add_rule(&mut state, rule).await,
        }
    }

    /// Replaces the item or rule stored under `name`; may rename.
    pub async fn update(&self, name: &str, object: impl Into<AuthObject>) -> Result<()> {
        let mut state = self.write().await?;
        match object.into() {
            AuthObject::Item(item) => self.update_item(&mut state, name, item).await,
            AuthObject::Rule(rule) => self.update_rule(&mut state, name, rule).await,
        }
    }

    /// Removes an item or rule. Returns `false` if it did not exist.
    pub async fn remove(&self, object: impl Into<AuthObject>) -> Result<bool> {
        match object.into() {
            AuthObject::Item(item) => self.remove_item(&item.name).await,
            AuthObject::Rule(rule) => self.remove_rule(rule.name()).await,
        }
    }

    /// Removes an item with its edges and assignments.
    pub async fn remove_item(&self, name: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if !state.catalog.contains(name) {
            return Ok(false);
        }
        self.storage.remove_item(name).await?;
        state.catalog.remove(name);
        let revoked = state.assignments.remove_item(name);
        log::info!("Removed item {name} ({revoked} assignments revoked)");
        Ok(true)
    }

    /// Removes a rule; items it gated become ungated.
    pub async fn remove_rule(&self, name: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if !state.rules.contains(name) {
            return Ok(false);
        }
        self.storage.remove_rule(name).await?;
        state.rules.remove(name);
        let ungated = state.catalog.repoint_rule(name, None);
        log::info!("Removed rule {name} ({ungated} items ungated)");
        Ok(true)
    }

    /// Registers a [`BasicRule`] for an unknown `rule_name`, returning the
    /// name when one was created.
    async fn ensure_rule(
        &self,
        state: &mut State,
        rule_name: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(rule_name) = rule_name else {
            return Ok(None);
        };
        if state.rules.contains(rule_name) {
            return Ok(None);
        }
        let rule: Arc<dyn Rule> = Arc::new(BasicRule::new(rule_name));
        self.storage.add_rule(&rule.definition()).await?;
        state.rules.register(rule)?;
        log::info!("Registered placeholder rule {rule_name}");
        Ok(Some(rule_name.to_string()))
    }

    /// Takes back a placeholder after the item write that needed it failed.
    /// The in-memory copy follows storage, so it stays if storage keeps it.
    async fn discard_placeholder(&self, state: &mut State, placeholder: Option<String>) {
        let Some(name) = placeholder else {
            return;
        };
        match self.storage.remove_rule(&name).await {
            Ok(()) => {
                state.rules.remove(&name);
                log::debug!("Discarded placeholder rule {name}");
            }
            Err(e) => log::warn!("Could not discard placeholder rule {name}: {e}"),
        }
    }

    async fn add_item(&self, state: &mut State, item: Item) -> Result<()> {
        if state.catalog.contains(&item.name) {
            return Err(Error::duplicate_item(&item.name));
        }
        let placeholder = self.ensure_rule(state, item.rule_name.as_deref()).await?;
        if let Err(e) = self.storage.add_item(&item).await {
            self.discard_placeholder(state, placeholder).await;
            return Err(e);
        }
        log::info!("Added {} {}", item.kind, item.name);
        state.catalog.put(item)
    }

    async fn add_rule(&self, state: &mut State, rule: Arc<dyn Rule>) -> Result<()> {
        if state.rules.contains(rule.name()) {
            return Err(Error::duplicate_rule(rule.name()));
        }
        self.storage.add_rule(&rule.definition()).await?;
        log::info!("Added rule {}", rule.name());
        state.rules.register(rule)
    }

    async fn update_item(&self, state: &mut State, name: &str, item: Item) -> Result<()> {
        if !state.catalog.contains(name) {
            return Err(Error::item_not_found(name));
        }
        if item.name != name && state.catalog.contains(&item.name) {
            return Err(Error::duplicate_item(&item.name));
        }
        let placeholder = self.ensure_rule(state, item.rule_name.as_deref()).await?;
        if let Err(e) = self.storage.update_item(name, &item).await {
            self.discard_placeholder(state, placeholder).await;
            return Err(e);
        }

        let new_name = item.name.clone();
        state.catalog.replace(name, item)?;
        state.assignments.rename_item(name, &new_name);
        log::info!("Updated item {name} -> {new_name}");
        Ok(())
    }

    async fn update_rule(&self, state: &mut State, name: &str, rule: Arc<dyn Rule>) -> Result<()> {
        if !state.rules.contains(name) {
            return Err(Error::rule_not_found(name));
        }
        if rule.name() != name && state.rules.contains(rule.name()) {
            return Err(Error::duplicate_rule(rule.name()));
        }
        self.storage.update_rule(name, &rule.definition()).await?;

        let new_name = rule.name().to_string();
        state.rules.replace(name, rule)?;
        if new_name != name {
            state.catalog.repoint_rule(name, Some(&new_name));
        }
        log::info!("Updated rule {name} -> {new_name}");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// A role by name.
    pub async fn get_role(&self, name: &str) -> Result<Option<Item>> {
        let state = self.read().await?;
        Ok(state.catalog.get(name).filter(|i| i.is_role()).cloned())
    }

    /// A permission by name.
    pub async fn get_permission(&self, name: &str) -> Result<Option<Item>> {
        let state = self.read().await?;
        Ok(state.catalog.get(name).filter(|i| i.is_permission()).cloned())
    }

    /// All roles in name order.
    pub async fn get_roles(&self) -> Result<Vec<Item>> {
        self.items_of_kind(ItemKind::Role).await
    }

    /// All permissions in name order.
    pub async fn get_permissions(&self) -> Result<Vec<Item>> {
        self.items_of_kind(ItemKind::Permission).await
    }

    async fn items_of_kind(&self, kind: ItemKind) -> Result<Vec<Item>> {
        let state = self.read().await?;
        Ok(state.catalog.items_of_kind(kind).cloned().collect())
    }

    /// A rule by name.
    pub async fn get_rule(&self, name: &str) -> Result<Option<Arc<dyn Rule>>> {
        let state = self.read().await?;
        Ok(state.rules.resolve(name))
    }

    /// All rules in name order.
    pub async fn get_rules(&self) -> Result<Vec<Arc<dyn Rule>>> {
        let state = self.read().await?;
        Ok(state.rules.rules().cloned().collect())
    }

    /// Roles directly assigned to `username`, plus the default roles.
    ///
    /// A default role missing from the catalog is reported as a bare role.
    pub async fn get_roles_by_user(&self, username: &str) -> Result<Vec<Item>> {
        let state = self.read().await?;
        let mut roles: BTreeMap<String, Item> = BTreeMap::new();
        for name in &self.options.default_roles {
            let role = state
                .catalog
                .get(name)
                .cloned()
                .unwrap_or_else(|| Item::role(name.clone()));
            roles.insert(name.clone(), role);
        }
        for name in state.assignments.assignments_of(username).into_keys() {
            if let Some(item) = state.catalog.get(&name).filter(|i| i.is_role()) {
                roles.insert(name, item.clone());
            }
        }
        Ok(roles.into_values().collect())
    }

    /// The role itself plus every role below it.
    pub async fn get_child_roles(&self, role_name: &str) -> Result<Vec<Item>> {
        let state = self.read().await?;
        let role = state
            .catalog
            .get(role_name)
            .filter(|i| i.is_role())
            .ok_or_else(|| Error::item_not_found(role_name))?;

        let mut roles = vec![role.clone()];
        roles.extend(
            state
                .catalog
                .descendants(role_name)
                .iter()
                .filter_map(|name| state.catalog.get(name))
                .filter(|i| i.is_role())
                .cloned(),
        );
        Ok(roles)
    }

    /// Permissions reachable below `role_name`.
    pub async fn get_permissions_by_role(&self, role_name: &str) -> Result<Vec<Item>> {
        let state = self.read().await?;
        Ok(permissions_below(&state.catalog, [role_name]))
    }

    /// Permissions directly assigned to `username` or reachable from any of
    /// its assigned items.
    pub async fn get_permissions_by_user(&self, username: &str) -> Result<Vec<Item>> {
        let state = self.read().await?;
        let assigned = state.assignments.assignments_of(username);
        let mut permissions: BTreeMap<String, Item> = assigned
            .keys()
            .filter_map(|name| state.catalog.get(name))
            .filter(|i| i.is_permission())
            .map(|i| (i.name.clone(), i.clone()))
            .collect();
        for item in permissions_below(&state.catalog, assigned.keys().map(String::as_str)) {
            permissions.insert(item.name.clone(), item);
        }
        Ok(permissions.into_values().collect())
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    /// Whether adding `parent → child` would succeed, without adding it.
    pub async fn can_add_child(&self, parent: &str, child: &str) -> Result<bool> {
        let state = self.read().await?;
        Ok(state.catalog.can_add_edge(parent, child))
    }

    /// Adds `parent → child`. Returns `false` if the edge already existed.
    pub async fn add_child(&self, parent: &str, child: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if state.catalog.has_edge(parent, child) {
            return Ok(false);
        }
        state.catalog.check_edge(parent, child)?;
        self.storage.add_child(parent, child).await?;
        state.catalog.add_edge(parent, child)?;
        log::info!("Added child {child} to {parent}");
        Ok(true)
    }

    /// Removes `parent → child`. Returns `false` if it did not exist.
    pub async fn remove_child(&self, parent: &str, child: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if !state.catalog.has_edge(parent, child) {
            return Ok(false);
        }
        self.storage.remove_child(parent, child).await?;
        state.catalog.remove_edge(parent, child);
        log::info!("Removed child {child} from {parent}");
        Ok(true)
    }

    /// Removes every edge below `parent`. Returns `false` if there were none.
    pub async fn remove_children(&self, parent: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if state.catalog.children_of(parent).is_empty() {
            return Ok(false);
        }
        self.storage.remove_children(parent).await?;
        state.catalog.remove_edges_from(parent);
        log::info!("Removed all children of {parent}");
        Ok(true)
    }

    /// Whether `parent → child` exists.
    pub async fn has_child(&self, parent: &str, child: &str) -> Result<bool> {
        let state = self.read().await?;
        Ok(state.catalog.has_edge(parent, child))
    }

    /// Direct children of `name`.
    pub async fn get_children(&self, name: &str) -> Result<Vec<Item>> {
        let state = self.read().await?;
        Ok(state
            .catalog
            .children_of(name)
            .iter()
            .filter_map(|child| state.catalog.get(child))
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------------

    /// Grants `item_name` to `username`.
    pub async fn assign(&self, item_name: &str, username: &str) -> Result<Assignment> {
        let mut state = self.write().await?;
        if !state.catalog.contains(item_name) {
            return Err(Error::item_not_found(item_name));
        }
        if state.assignments.contains(username, item_name) {
            return Err(Error::DuplicateAssignment {
                username: username.to_string(),
                item: item_name.to_string(),
            });
        }
        let assignment = Assignment::new(username, item_name);
        self.storage.assign(&assignment).await?;
        state.assignments.assign(username, item_name)?;
        log::info!("Assigned {item_name} to {username}");
        Ok(assignment)
    }

    /// Revokes one grant. Returns `false` if it did not exist.
    pub async fn revoke(&self, item_name: &str, username: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if !state.assignments.contains(username, item_name) {
            return Ok(false);
        }
        self.storage.revoke(username, item_name).await?;
        state.assignments.revoke(username, item_name);
        log::info!("Revoked {item_name} from {username}");
        Ok(true)
    }

    /// Revokes every grant of `username`. Returns `false` if there were none.
    pub async fn revoke_all(&self, username: &str) -> Result<bool> {
        let mut state = self.write().await?;
        if state.assignments.assignments_of(username).is_empty() {
            return Ok(false);
        }
        self.storage.revoke_all(username).await?;
        state.assignments.revoke_all(username);
        log::info!("Revoked all assignments of {username}");
        Ok(true)
    }

    /// One grant, if present.
    pub async fn get_assignment(&self, item_name: &str, username: &str) -> Result<Option<Assignment>> {
        let state = self.read().await?;
        Ok(state.assignments.get(username, item_name).cloned())
    }

    /// Every grant of `username`, keyed by item name.
    pub async fn get_assignments(&self, username: &str) -> Result<BTreeMap<String, Assignment>> {
        let state = self.read().await?;
        Ok(state.assignments.assignments_of(username))
    }

    /// Users directly granted `item_name`.
    pub async fn get_usernames_by_item(&self, item_name: &str) -> Result<Vec<String>> {
        let state = self.read().await?;
        Ok(state.assignments.usernames_granted(item_name))
    }

    // ------------------------------------------------------------------------
    // Bulk removal
    // ------------------------------------------------------------------------

    async fn clear(&self, scope: ClearScope) -> Result<()> {
        let mut state = self.write().await?;
        self.storage.clear(scope).await?;
        state.clear(scope);
        log::info!("Cleared {scope:?}");
        Ok(())
    }

    /// Removes every item, edge, rule, and assignment.
    pub async fn remove_all(&self) -> Result<()> {
        self.clear(ClearScope::All).await
    }

    /// Removes every permission with its edges and assignments.
    pub async fn remove_all_permissions(&self) -> Result<()> {
        self.clear(ClearScope::Permissions).await
    }

    /// Removes every role with its edges and assignments.
    pub async fn remove_all_roles(&self) -> Result<()> {
        self.clear(ClearScope::Roles).await
    }

    /// Removes every rule; items become ungated.
    pub async fn remove_all_rules(&self) -> Result<()> {
        self.clear(ClearScope::Rules).await
    }

    /// Removes every assignment.
    pub async fn remove_all_assignments(&self) -> Result<()> {
        self.clear(ClearScope::Assignments).await
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Exports the graph in its wire shape.
    pub async fn snapshot(&self, mode: AssignmentsMode<'_>) -> Result<Snapshot> {
        let state = self.read().await?;
        let assignments = match mode {
            AssignmentsMode::User(username) => AssignmentsView::User(
                state.assignments.assignments_of(username).into_keys().collect(),
            ),
            AssignmentsMode::All => {
                AssignmentsView::All(records::assignment_records(&state.assignments))
            }
        };
        Ok(Snapshot {
            items: records::item_records(&state.catalog),
            rules: records::rule_records(state.rules.definitions())?,
            assignments,
        })
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("options", &self.options)
            .field("rule_types", &self.rule_types)
            .finish_non_exhaustive()
    }
}

/// Permissions reachable from any of `roots`, excluding the roots.
fn permissions_below<'a, I>(catalog: &Catalog, roots: I) -> Vec<Item>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: BTreeSet<String> = roots
        .into_iter()
        .flat_map(|root| catalog.descendants(root))
        .collect();
    names
        .iter()
        .filter_map(|name| catalog.get(name))
        .filter(|i| i.is_permission())
        .cloned()
        .collect()
}
