// Gatekeep
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Per-entity-type permission profiles
//!
//! A profile holds the default grants for each relationship tier, grants
//! that apply to members of specific actor groups, the mandatory-membership
//! flag, and the registry of roles defined for the type.

use crate::error::{GatekeepError, GatekeepResult};
use crate::role::Role;
use crate::taxonomy::OperationTaxonomy;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Permission configuration for one entity type
#[derive(Debug)]
pub struct PermissionProfile {
    type_name: String,
    default_visitor_ops: BTreeSet<String>,
    default_user_ops: BTreeSet<String>,
    default_group_member_ops: BTreeSet<String>,

    /// Grants applied whenever the actor belongs to the group, whatever the entity's groups
    group_override_ops: BTreeMap<String, BTreeSet<String>>,

    /// Require the actor to share a group with the entity before anything is granted
    membership_mandatory: bool,

    roles: RwLock<HashMap<String, Arc<Role>>>,
    validated: AtomicBool,
}

fn to_set<I, S>(operations: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    operations.into_iter().map(Into::into).collect()
}

impl PermissionProfile {
    /// Create an empty profile for an entity type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            default_visitor_ops: BTreeSet::new(),
            default_user_ops: BTreeSet::new(),
            default_group_member_ops: BTreeSet::new(),
            group_override_ops: BTreeMap::new(),
            membership_mandatory: false,
            roles: RwLock::new(HashMap::new()),
            validated: AtomicBool::new(false),
        }
    }

    /// Set operations granted to unauthenticated visitors
    pub fn with_default_visitor_ops<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_visitor_ops = to_set(operations);
        self
    }

    /// Set operations granted to any authenticated actor
    pub fn with_default_user_ops<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_user_ops = to_set(operations);
        self
    }

    /// Set operations granted to actors sharing a group with the entity
    pub fn with_default_group_member_ops<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_group_member_ops = to_set(operations);
        self
    }

    /// Grant operations to every actor in `group`
    pub fn with_group_override<I, S>(mut self, group: impl Into<String>, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_override_ops.entry(group.into()).or_default().extend(to_set(operations));
        self
    }

    pub fn with_membership_mandatory(mut self, mandatory: bool) -> Self {
        self.membership_mandatory = mandatory;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn default_visitor_ops(&self) -> &BTreeSet<String> {
        &self.default_visitor_ops
    }

    pub fn default_user_ops(&self) -> &BTreeSet<String> {
        &self.default_user_ops
    }

    pub fn default_group_member_ops(&self) -> &BTreeSet<String> {
        &self.default_group_member_ops
    }

    pub fn group_override_ops(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.group_override_ops.get(group)
    }

    pub fn group_overrides(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.group_override_ops
    }

    pub fn membership_mandatory(&self) -> bool {
        self.membership_mandatory
    }

    /// Look up a registered role by name
    pub fn role(&self, name: &str) -> Option<Arc<Role>> {
        self.roles.read().get(name).cloned()
    }

    /// All registered roles, ordered by name
    pub fn roles(&self) -> Vec<Arc<Role>> {
        let mut roles: Vec<Arc<Role>> = self.roles.read().values().cloned().collect();
        roles.sort_by(|a, b| a.name().cmp(b.name()));
        roles
    }

    /// Register a role, replacing any role of the same name
    pub fn register_role(&self, role: Arc<Role>) -> Option<Arc<Role>> {
        self.roles.write().insert(role.name().to_string(), role)
    }

    /// Register every role of `other` this profile does not define itself
    pub fn inherit_roles(&self, other: &PermissionProfile) -> usize {
        let inherited = other.roles();
        let mut roles = self.roles.write();
        let before = roles.len();
        for role in inherited {
            roles.entry(role.name().to_string()).or_insert(role);
        }
        roles.len() - before
    }

    /// Remove a role from the registry
    pub fn remove_role(&self, name: &str) -> Option<Arc<Role>> {
        self.roles.write().remove(name)
    }

    /// Every operation named by the defaults and group overrides
    pub fn referenced_operations(&self) -> impl Iterator<Item = &str> {
        self.default_visitor_ops
            .iter()
            .chain(&self.default_user_ops)
            .chain(&self.default_group_member_ops)
            .chain(self.group_override_ops.values().flatten())
            .map(String::as_str)
    }

    /// Check every referenced operation against the taxonomy, once per profile
    pub fn validate(&self, taxonomy: &OperationTaxonomy) -> GatekeepResult<()> {
        if self.validated.load(Ordering::Acquire) {
            return Ok(());
        }

        if let Some(operation) = self.referenced_operations().find(|op| !taxonomy.find(op)) {
            return Err(GatekeepError::InvalidProfile {
                profile: self.type_name.clone(),
                operation: operation.to_string(),
            });
        }

        self.validated.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }
}

impl From<&ProfileDefinition> for PermissionProfile {
    fn from(definition: &ProfileDefinition) -> Self {
        let mut profile = PermissionProfile::new(definition.type_name.clone())
            .with_default_visitor_ops(definition.default_visitor_ops.iter().cloned())
            .with_default_user_ops(definition.default_user_ops.iter().cloned())
            .with_default_group_member_ops(definition.default_group_member_ops.iter().cloned())
            .with_membership_mandatory(definition.membership_mandatory);

        for (group, operations) in &definition.group_override_ops {
            profile = profile.with_group_override(group.clone(), operations.iter().cloned());
        }
        profile
    }
}

/// Declarative form of a profile, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDefinition {
    pub type_name: String,
    pub default_visitor_ops: Vec<String>,
    pub default_user_ops: Vec<String>,
    pub default_group_member_ops: Vec<String>,
    pub group_override_ops: BTreeMap<String, Vec<String>>,
    pub membership_mandatory: bool,

    /// Role name to operations; registered through the engine so they are persisted
    pub roles: BTreeMap<String, Vec<String>>,
}

impl ProfileDefinition {
    /// Parse a definition from JSON
    pub fn from_json(json: &str) -> GatekeepResult<Self> {
        let definition: Self = serde_json::from_str(json).map_err(|e| GatekeepError::InvalidRegistration { message: e.to_string() })?;
        if definition.type_name.is_empty() {
            return Err(GatekeepError::InvalidRegistration {
                message: "profile definition requires a type_name".to_string(),
            });
        }
        Ok(definition)
    }
}

/// Future returned by profile providers
pub type ProfileFuture = BoxFuture<'static, GatekeepResult<Arc<PermissionProfile>>>;

/// Where an entity's profile comes from when it declares its own
#[derive(Clone)]
pub enum ProfileSource {
    /// A profile value shared with the caller
    Static(Arc<PermissionProfile>),
    /// A possibly asynchronous provider; the engine keeps its first result per entity type
    Provider(Arc<dyn Fn() -> ProfileFuture + Send + Sync>),
}

impl ProfileSource {
    /// Wrap an async provider function
    pub fn provider<F, Fut>(provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatekeepResult<Arc<PermissionProfile>>> + Send + 'static,
    {
        ProfileSource::Provider(Arc::new(move || provider().boxed()))
    }

    pub async fn resolve(&self) -> GatekeepResult<Arc<PermissionProfile>> {
        match self {
            ProfileSource::Static(profile) => Ok(profile.clone()),
            ProfileSource::Provider(provider) => provider().await,
        }
    }
}

impl From<Arc<PermissionProfile>> for ProfileSource {
    fn from(profile: Arc<PermissionProfile>) -> Self {
        ProfileSource::Static(profile)
    }
}

impl fmt::Debug for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::Static(profile) => f.debug_tuple("Static").field(&profile.type_name()).finish(),
            ProfileSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> OperationTaxonomy {
        OperationTaxonomy::standard().unwrap()
    }

    #[test]
    fn test_profile_builder() {
        let profile = PermissionProfile::new("Workshop")
            .with_default_user_ops(["Buy", "Order"])
            .with_group_override("IRS", ["ReadDeep"])
            .with_membership_mandatory(true);

        assert_eq!(profile.type_name(), "Workshop");
        assert!(profile.default_user_ops().contains("Buy"));
        assert!(profile.default_visitor_ops().is_empty());
        assert!(profile.group_override_ops("IRS").unwrap().contains("ReadDeep"));
        assert!(profile.group_override_ops("workers").is_none());
        assert!(profile.membership_mandatory());
    }

    #[test]
    fn test_inherit_roles_keeps_own_definitions() {
        let previous = PermissionProfile::new("Workshop");
        previous.register_role(Arc::new(Role::new("Seller", ["Sell"], "Workshop")));
        previous.register_role(Arc::new(Role::new("Clerk", ["Order"], "Workshop")));

        let replacement = PermissionProfile::new("Workshop").with_default_user_ops(["Buy"]);
        replacement.register_role(Arc::new(Role::new("Clerk", ["ReadCommon"], "Workshop")));

        assert_eq!(replacement.inherit_roles(&previous), 1);
        assert!(replacement.role("Seller").unwrap().operations().contains("Sell"));
        assert!(replacement.role("Clerk").unwrap().operations().contains("ReadCommon"));
        assert_eq!(replacement.inherit_roles(&previous), 0);
    }

    #[test]
    fn test_validation_runs_once() {
        let profile = PermissionProfile::new("Workshop").with_default_user_ops(["Buy"]);
        assert!(!profile.is_validated());

        profile.validate(&taxonomy()).unwrap();
        assert!(profile.is_validated());
        profile.validate(&taxonomy()).unwrap();
    }

    #[test]
    fn test_validation_rejects_unknown_operation() {
        let profile = PermissionProfile::new("Workshop").with_group_override("IRS", ["Audit"]);

        match profile.validate(&taxonomy()) {
            Err(GatekeepError::InvalidProfile { profile, operation }) => {
                assert_eq!(profile, "Workshop");
                assert_eq!(operation, "Audit");
            }
            other => panic!("expected InvalidProfile, got {:?}", other),
        }
        assert!(!profile.is_validated());
    }

    #[test]
    fn test_role_registry_last_write_wins() {
        let profile = PermissionProfile::new("Workshop");

        assert!(profile.register_role(Arc::new(Role::new("Seller", ["Sell"], "Workshop"))).is_none());
        let previous = profile.register_role(Arc::new(Role::new("Seller", ["ReadDeep"], "Workshop")));

        assert!(previous.unwrap().grants("Sell"));
        let current = profile.role("Seller").unwrap();
        assert!(current.grants("ReadDeep"));
        assert!(!current.grants("Sell"));
        assert_eq!(profile.roles().len(), 1);

        assert!(profile.remove_role("Seller").is_some());
        assert!(profile.role("Seller").is_none());
    }

    #[test]
    fn test_definition_from_json() {
        let definition = ProfileDefinition::from_json(
            r#"{
                "type_name": "Workshop",
                "default_user_ops": ["Buy", "Order"],
                "group_override_ops": {"IRS": ["ReadDeep"]},
                "roles": {"Seller": ["ReadDeep", "Sell"]}
            }"#,
        )
        .unwrap();

        let profile = PermissionProfile::from(&definition);
        assert_eq!(profile.type_name(), "Workshop");
        assert!(profile.default_user_ops().contains("Order"));
        assert!(profile.group_override_ops("IRS").unwrap().contains("ReadDeep"));
        assert!(!profile.membership_mandatory());
        assert_eq!(definition.roles["Seller"], vec!["ReadDeep", "Sell"]);

        assert!(ProfileDefinition::from_json(r#"{"default_user_ops": ["Buy"]}"#).is_err());
    }

    #[tokio::test]
    async fn test_profile_source_provider() {
        let shared = Arc::new(PermissionProfile::new("Report").with_default_visitor_ops(["ReadHeadline"]));
        let captured = shared.clone();
        let source = ProfileSource::provider(move || {
            let profile = captured.clone();
            async move { Ok(profile) }
        });

        let resolved = source.resolve().await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &shared));
        assert_eq!(format!("{:?}", source), "Provider(..)");

        let fixed = ProfileSource::from(shared.clone());
        assert!(Arc::ptr_eq(&fixed.resolve().await.unwrap(), &shared));
    }
}
