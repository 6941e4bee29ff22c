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

//! Authorization engine coordinating taxonomy, profiles, store and audit

use crate::audit::AuditLogger;
use crate::config::EngineConfig;
use crate::decision::{CustomDecision, DecisionInputs, DecisionRequest, find_grant};
use crate::error::{GatekeepError, GatekeepResult};
use crate::groups::common_groups;
use crate::profile::{PermissionProfile, ProfileDefinition, ProfileSource};
use crate::role::Role;
use crate::store::{PermissionStore, RoleNameMap};
use crate::subject::{Actor, ManagedEntity};
use crate::taxonomy::{OperationTaxonomy, OperationTree};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::future::{BoxFuture, FutureExt};
use metrics::{counter, histogram};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type TaxonomyTransform = Box<dyn FnOnce(OperationTree) -> OperationTree + Send>;

/// Builder for [`AuthorizationEngine`]
pub struct EngineBuilder {
    store: Arc<dyn PermissionStore>,
    config: EngineConfig,
    tree: OperationTree,
    transform: Option<TaxonomyTransform>,
}

impl EngineBuilder {
    /// Create a new builder over the standard taxonomy and default configuration
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            tree: OperationTree::standard(),
            transform: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the operation tree the taxonomy is built from
    pub fn with_taxonomy_tree(mut self, tree: OperationTree) -> Self {
        self.tree = tree;
        self
    }

    /// Adjust the operation tree before the taxonomy is built
    pub fn with_taxonomy_transform<F>(mut self, transform: F) -> Self
    where
        F: FnOnce(OperationTree) -> OperationTree + Send + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn build(self) -> GatekeepResult<AuthorizationEngine> {
        let tree = match self.transform {
            Some(transform) => transform(self.tree),
            None => self.tree,
        };
        let taxonomy = OperationTaxonomy::build(&tree)?;

        let audit = if self.config.audit_enabled {
            AuditLogger::with_max_events(self.config.audit_max_events)
        } else {
            AuditLogger::disabled()
        };

        info!(
            operations = taxonomy.len(),
            max_ancestor_depth = self.config.max_ancestor_depth,
            audit_enabled = self.config.audit_enabled,
            "Authorization engine initialized"
        );

        Ok(AuthorizationEngine {
            store: self.store,
            taxonomy: Arc::new(taxonomy),
            profiles: DashMap::new(),
            provided_types: DashSet::new(),
            custom_decisions: DashMap::new(),
            config: self.config,
            audit: Arc::new(audit),
        })
    }
}

/// Decides whether actors may perform operations on managed entities
pub struct AuthorizationEngine {
    store: Arc<dyn PermissionStore>,
    taxonomy: Arc<OperationTaxonomy>,

    /// Type-level profiles, created on first use
    profiles: DashMap<String, Arc<PermissionProfile>>,

    /// Types whose profile provider has already been consulted
    provided_types: DashSet<String>,

    /// Type-level custom decisions
    custom_decisions: DashMap<String, Arc<dyn CustomDecision>>,

    config: EngineConfig,
    audit: Arc<AuditLogger>,
}

impl AuthorizationEngine {
    pub fn builder(store: Arc<dyn PermissionStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    /// Create an engine with the standard taxonomy and default configuration
    pub fn new(store: Arc<dyn PermissionStore>) -> GatekeepResult<Self> {
        EngineBuilder::new(store).build()
    }

    pub fn taxonomy(&self) -> &OperationTaxonomy {
        &self.taxonomy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audit_logger(&self) -> Arc<AuditLogger> {
        self.audit.clone()
    }

    pub fn store(&self) -> Arc<dyn PermissionStore> {
        self.store.clone()
    }

    /// Whether `actor` may perform `operation` on `entity`
    ///
    /// Denial is `Ok(false)`. Errors are configuration defects (an undefined
    /// operation, an invalid profile, a runaway ancestor chain) or failures of
    /// the store and providers.
    pub async fn is_allowed(&self, actor: &dyn Actor, operation: &str, entity: &dyn ManagedEntity, context: Option<&Value>) -> GatekeepResult<bool> {
        let start_time = Instant::now();
        let request = DecisionRequest::new(actor, operation, entity, context);

        let allowed = match self.evaluate(&request).await {
            Ok(allowed) => allowed,
            Err(e) => {
                counter!("gatekeep_decisions_total", 1, "outcome" => e.error_type());
                return Err(e);
            }
        };

        let duration = start_time.elapsed();
        counter!("gatekeep_decisions_total", 1, "outcome" => if allowed { "allowed" } else { "denied" });
        histogram!("gatekeep_decision_duration_seconds", duration.as_secs_f64());

        self.audit
            .log_decision(actor.authenticated_id(), operation, entity.type_name(), entity.id(), allowed, context)
            .await;

        if duration > self.config.slow_decision_threshold {
            warn!(
                actor_id = ?actor.authenticated_id(),
                operation = %operation,
                entity_id = %entity.id(),
                duration_ms = %duration.as_millis(),
                "Slow authorization decision detected"
            );
        }

        debug!(
            actor_id = ?actor.authenticated_id(),
            operation = %operation,
            entity_type = %entity.type_name(),
            entity_id = %entity.id(),
            allowed = %allowed,
            duration_us = %duration.as_micros(),
            "Authorization decision completed"
        );

        Ok(allowed)
    }

    /// Like [`is_allowed`](Self::is_allowed), but a denial is [`GatekeepError::AccessDenied`]
    pub async fn test(&self, actor: &dyn Actor, operation: &str, entity: &dyn ManagedEntity, context: Option<&Value>) -> GatekeepResult<()> {
        if self.is_allowed(actor, operation, entity, context).await? {
            return Ok(());
        }

        Err(GatekeepError::AccessDenied {
            actor_id: actor.authenticated_id().map(str::to_string),
            operation: operation.to_string(),
            entity_id: entity.id().to_string(),
            context: context.cloned(),
        })
    }

    fn evaluate<'a>(&'a self, request: &'a DecisionRequest<'a>) -> BoxFuture<'a, GatekeepResult<bool>> {
        async move {
            if !self.taxonomy.find(request.operation()) {
                return Err(GatekeepError::UndefinedOperation {
                    operation: request.operation().to_string(),
                });
            }

            match self.custom_decision_for(request.entity()) {
                Some(decision) => decision.decide(self, request).await,
                None => self.standard_decision(request).await,
            }
        }
        .boxed()
    }

    fn custom_decision_for(&self, entity: &dyn ManagedEntity) -> Option<Arc<dyn CustomDecision>> {
        entity
            .custom_decision()
            .or_else(|| self.custom_decisions.get(entity.type_name()).map(|decision| decision.value().clone()))
    }

    /// The built-in precedence ladder, with ancestor delegation
    pub async fn standard_decision(&self, request: &DecisionRequest<'_>) -> GatekeepResult<bool> {
        let actor = request.actor();
        let entity = request.entity();

        let profile = self.resolve_profile(entity).await?;
        let implied = self.taxonomy.expand(request.operation())?;

        // Visitors cannot hold assignments
        let assigned = match actor.authenticated_id() {
            Some(actor_id) => self.store.get_roles_for_user(actor_id, entity.id(), &profile).await?,
            None => Vec::new(),
        };

        let actor_groups = actor.groups().resolve().await?;
        let entity_groups = entity.group_ids().resolve().await?;
        let common = common_groups(&actor_groups, &entity_groups);

        let inputs = DecisionInputs {
            assigned: &assigned,
            actor_groups: &actor_groups,
            common_groups: &common,
            authenticated: !actor.is_visitor(),
        };

        if let Some(grant) = find_grant(&profile, implied, &inputs) {
            debug!(
                actor_id = ?actor.authenticated_id(),
                operation = %request.operation(),
                entity_id = %entity.id(),
                tier = %inputs.tier().as_str(),
                granted = %grant.operation,
                source = ?grant.source,
                "Operation granted"
            );
            return Ok(true);
        }

        let Some(ancestor) = entity.ancestor().await? else {
            return Ok(false);
        };

        let ancestor_request = request.for_ancestor(ancestor.as_ref(), self.config.max_ancestor_depth)?;
        debug!(
            entity_id = %entity.id(),
            ancestor_id = %ancestor.id(),
            depth = ancestor_request.depth(),
            "Delegating decision to ancestor"
        );

        self.evaluate(&ancestor_request).await
    }

    /// The entity's own profile if it declares one, otherwise its type's profile
    ///
    /// A declared profile becomes the type's profile, so roles added to the type reach it.
    /// Providers are consulted once per type.
    async fn resolve_profile(&self, entity: &dyn ManagedEntity) -> GatekeepResult<Arc<PermissionProfile>> {
        let type_name = entity.type_name();
        let profile = match entity.profile() {
            Some(ProfileSource::Static(profile)) => {
                profile.validate(&self.taxonomy)?;
                self.install_profile(type_name, profile)
            }
            Some(ProfileSource::Provider(_)) if self.provided_types.contains(type_name) => self.profile_for_type(type_name),
            Some(source) => {
                let profile = source.resolve().await?;
                profile.validate(&self.taxonomy)?;
                let profile = self.install_profile(type_name, profile);
                self.provided_types.insert(type_name.to_string());
                debug!(entity_type = %type_name, "Provided profile cached");
                profile
            }
            None => self.profile_for_type(type_name),
        };

        profile.validate(&self.taxonomy)?;
        Ok(profile)
    }

    /// Make `profile` the profile of `type_name`, keeping the roles registered on the one it replaces
    fn install_profile(&self, type_name: &str, profile: Arc<PermissionProfile>) -> Arc<PermissionProfile> {
        if self.profiles.get(type_name).is_some_and(|current| Arc::ptr_eq(current.value(), &profile)) {
            return profile;
        }

        match self.profiles.entry(type_name.to_string()) {
            Entry::Occupied(mut entry) => {
                if !Arc::ptr_eq(entry.get(), &profile) {
                    profile.inherit_roles(entry.get());
                    entry.insert(profile.clone());
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(profile.clone());
            }
        }
        profile
    }

    /// Profile registered for `type_name`, created empty on first use
    pub fn profile_for_type(&self, type_name: &str) -> Arc<PermissionProfile> {
        if let Some(profile) = self.profiles.get(type_name) {
            return profile.value().clone();
        }

        self.profiles
            .entry(type_name.to_string())
            .or_insert_with(|| Arc::new(PermissionProfile::new(type_name)))
            .value()
            .clone()
    }

    /// Install the profile for its entity type
    ///
    /// Replaces any previous profile's defaults; roles registered on it are carried over
    /// unless the new profile defines a role of the same name.
    pub async fn register_profile(&self, profile: PermissionProfile) -> GatekeepResult<Arc<PermissionProfile>> {
        if profile.type_name().is_empty() {
            return Err(GatekeepError::InvalidRegistration {
                message: "profile requires an entity type name".to_string(),
            });
        }

        profile.validate(&self.taxonomy)?;

        let type_name = profile.type_name().to_string();
        let profile = self.install_profile(&type_name, Arc::new(profile));

        self.audit.log_profile_registered(&type_name).await;
        info!(entity_type = %type_name, "Permission profile registered");

        Ok(profile)
    }

    /// Register a declarative profile and its roles
    ///
    /// Nothing is installed unless every role names known operations.
    pub async fn load_profile(&self, definition: &ProfileDefinition) -> GatekeepResult<Arc<PermissionProfile>> {
        for (role_name, operations) in &definition.roles {
            if role_name.is_empty() {
                return Err(GatekeepError::InvalidRegistration {
                    message: format!("profile {} defines a role without a name", definition.type_name),
                });
            }
            if let Some(operation) = operations.iter().find(|op| !self.taxonomy.find(op)) {
                return Err(GatekeepError::UndefinedOperation { operation: operation.clone() });
            }
        }

        let profile = self.register_profile(PermissionProfile::from(definition)).await?;

        for (role_name, operations) in &definition.roles {
            self.add_role(role_name, operations.iter().cloned(), &definition.type_name).await?;
        }

        Ok(profile)
    }

    /// Use `decision` instead of the standard algorithm for every entity of `type_name`
    pub fn register_custom_decision(&self, type_name: &str, decision: Arc<dyn CustomDecision>) -> GatekeepResult<()> {
        if type_name.is_empty() {
            return Err(GatekeepError::InvalidRegistration {
                message: "custom decision requires an entity type name".to_string(),
            });
        }

        self.custom_decisions.insert(type_name.to_string(), decision);
        info!(entity_type = %type_name, "Custom decision registered");
        Ok(())
    }

    /// Define a role on an entity type and persist it
    pub async fn add_role<I, S>(&self, name: &str, operations: I, entity_type: &str) -> GatekeepResult<Arc<Role>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name.is_empty() || entity_type.is_empty() {
            return Err(GatekeepError::InvalidRegistration {
                message: "role requires a name and an entity type".to_string(),
            });
        }

        let role = Role::new(name, operations, entity_type);
        if let Some(operation) = role.operations().iter().find(|op| !self.taxonomy.find(op)) {
            return Err(GatekeepError::UndefinedOperation { operation: operation.clone() });
        }

        let role = Arc::new(role);
        // Registered before persisting so the next decision already sees it.
        // The entry guard keeps a concurrent profile replacement from dropping the role.
        self.profiles
            .entry(entity_type.to_string())
            .or_insert_with(|| Arc::new(PermissionProfile::new(entity_type)))
            .register_role(role.clone());
        self.store.save_role(entity_type, &role).await?;

        counter!("gatekeep_role_mutations_total", 1, "kind" => "created");
        self.audit.log_role_created(name, entity_type, role.operations().len()).await;
        info!(
            role = %name,
            entity_type = %entity_type,
            operations = role.operations().len(),
            "Role created"
        );

        Ok(role)
    }

    /// Define the same role on several entity types
    pub async fn add_role_for_types<I, S>(&self, name: &str, operations: I, entity_types: &[&str]) -> GatekeepResult<Vec<Arc<Role>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operations: Vec<String> = operations.into_iter().map(Into::into).collect();
        let mut roles = Vec::with_capacity(entity_types.len());

        for entity_type in entity_types {
            roles.push(self.add_role(name, operations.iter().cloned(), entity_type).await?);
        }

        Ok(roles)
    }

    /// Remove a role from its type's registry and from the store
    ///
    /// Existing assignments of the name are left in the store and ignored by decisions.
    pub async fn delete_role(&self, name: &str, entity_type: &str) -> GatekeepResult<()> {
        let removed = self.profiles.get(entity_type).and_then(|profile| profile.remove_role(name));
        self.store.delete_role(name, entity_type).await?;

        counter!("gatekeep_role_mutations_total", 1, "kind" => "deleted");
        self.audit.log_role_deleted(name, entity_type).await;
        info!(
            role = %name,
            entity_type = %entity_type,
            was_registered = removed.is_some(),
            "Role deleted"
        );

        Ok(())
    }

    /// Give `actor` the role `role_name` on `entity`
    pub async fn assign_role(&self, entity: &dyn ManagedEntity, actor: &dyn Actor, role_name: &str) -> GatekeepResult<()> {
        let actor_id = actor.authenticated_id().ok_or_else(|| GatekeepError::AnonymousActor {
            action: "assign a role".to_string(),
        })?;

        let profile = self.resolve_profile(entity).await?;
        if profile.role(role_name).is_none() {
            return Err(GatekeepError::UnknownRole {
                role: role_name.to_string(),
                entity_type: entity.type_name().to_string(),
            });
        }

        self.store.assign_role(entity.id(), actor_id, role_name).await?;

        counter!("gatekeep_role_mutations_total", 1, "kind" => "assigned");
        self.audit.log_role_assigned(actor_id, role_name, entity.type_name(), entity.id()).await;
        info!(
            actor_id = %actor_id,
            role = %role_name,
            entity_type = %entity.type_name(),
            entity_id = %entity.id(),
            "Role assigned successfully"
        );

        Ok(())
    }

    /// Remove one assignment of `role_name` from `actor` on `entity`
    pub async fn revoke_role(&self, entity: &dyn ManagedEntity, actor: &dyn Actor, role_name: &str) -> GatekeepResult<()> {
        let actor_id = actor.authenticated_id().ok_or_else(|| GatekeepError::AnonymousActor {
            action: "revoke a role".to_string(),
        })?;

        self.store.remove_role(entity.id(), actor_id, role_name).await?;

        counter!("gatekeep_role_mutations_total", 1, "kind" => "revoked");
        self.audit.log_role_revoked(actor_id, role_name, entity.type_name(), entity.id()).await;
        info!(
            actor_id = %actor_id,
            role = %role_name,
            entity_id = %entity.id(),
            "Role revoked successfully"
        );

        Ok(())
    }

    /// Roles currently assigned to `actor` on `entity`
    pub async fn get_roles_for_actor(&self, actor: &dyn Actor, entity: &dyn ManagedEntity) -> GatekeepResult<Vec<Arc<Role>>> {
        let Some(actor_id) = actor.authenticated_id() else {
            return Ok(Vec::new());
        };

        let profile = self.resolve_profile(entity).await?;
        Ok(self.store.get_roles_for_user(actor_id, entity.id(), &profile).await?)
    }

    /// Actor id to role names assigned on `entity`
    pub async fn get_role_owners(&self, entity: &dyn ManagedEntity) -> GatekeepResult<RoleNameMap> {
        Ok(self.store.get_role_owners(entity.id()).await?)
    }

    /// Entity id to role names for `actor_id`, one page at a time
    pub async fn get_actor_roles(&self, actor_id: &str, skip: usize, limit: usize) -> GatekeepResult<RoleNameMap> {
        Ok(self.store.get_actor_roles(actor_id, skip, limit).await?)
    }
}

impl fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("operations", &self.taxonomy.len())
            .field("profiles", &self.profiles.len())
            .field("custom_decisions", &self.custom_decisions.len())
            .field("config", &self.config)
            .finish()
    }
}
