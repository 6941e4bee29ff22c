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

//! Decision requests, custom decisions and the standard precedence ladder
//!
//! The ladder itself is a pure function over already-resolved inputs: the
//! engine fetches roles and groups, then asks [`find_grant`] whether any
//! operation implied by the request is granted, and by which clause.

use crate::engine::AuthorizationEngine;
use crate::error::{GatekeepError, GatekeepResult};
use crate::groups::GroupSet;
use crate::profile::PermissionProfile;
use crate::role::{GROUP_MEMBER_ROLE, Role, USER_ROLE, VISITOR_ROLE, group_role_name};
use crate::subject::{Actor, ManagedEntity};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Replaces the standard algorithm for an entity or entity type
///
/// Implementations may call [`AuthorizationEngine::standard_decision`] to extend
/// the standard behavior instead of replacing it.
#[async_trait]
pub trait CustomDecision: Send + Sync {
    async fn decide(&self, engine: &AuthorizationEngine, request: &DecisionRequest<'_>) -> GatekeepResult<bool>;
}

/// One access question: may `actor` perform `operation` on `entity`
#[derive(Clone)]
pub struct DecisionRequest<'a> {
    actor: &'a dyn Actor,
    operation: &'a str,
    entity: &'a dyn ManagedEntity,
    context: Option<&'a Value>,
    depth: usize,
    /// `(type_name, id)` of every entity evaluated before this one
    trail: Vec<(String, String)>,
}

impl<'a> DecisionRequest<'a> {
    /// Create a new top-level request
    pub fn new(actor: &'a dyn Actor, operation: &'a str, entity: &'a dyn ManagedEntity, context: Option<&'a Value>) -> Self {
        Self {
            actor,
            operation,
            entity,
            context,
            depth: 0,
            trail: Vec::new(),
        }
    }

    pub fn actor(&self) -> &'a dyn Actor {
        self.actor
    }

    pub fn operation(&self) -> &'a str {
        self.operation
    }

    pub fn entity(&self) -> &'a dyn ManagedEntity {
        self.entity
    }

    /// Opaque caller context, only meaningful to custom decisions
    pub fn context(&self) -> Option<&'a Value> {
        self.context
    }

    /// Number of ancestor hops taken to reach this entity
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Same question asked of the entity's ancestor
    pub fn for_ancestor<'b>(&'b self, ancestor: &'b dyn ManagedEntity, max_depth: usize) -> GatekeepResult<DecisionRequest<'b>> {
        if self.depth + 1 > max_depth {
            return Err(GatekeepError::AncestorDepthExceeded {
                entity_id: self.entity.id().to_string(),
                limit: max_depth,
            });
        }

        let mut trail = self.trail.clone();
        trail.push((self.entity.type_name().to_string(), self.entity.id().to_string()));

        if trail.iter().any(|(type_name, id)| type_name == ancestor.type_name() && id == ancestor.id()) {
            return Err(GatekeepError::AncestorCycle {
                type_name: ancestor.type_name().to_string(),
                entity_id: ancestor.id().to_string(),
            });
        }

        Ok(DecisionRequest {
            actor: self.actor,
            operation: self.operation,
            entity: ancestor,
            context: self.context,
            depth: self.depth + 1,
            trail,
        })
    }
}

impl fmt::Debug for DecisionRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionRequest")
            .field("actor", &self.actor.id())
            .field("operation", &self.operation)
            .field("entity", &format_args!("{}:{}", self.entity.type_name(), self.entity.id()))
            .field("context", &self.context)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Relationship tier of an actor towards an entity, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    GroupMember,
    User,
    Visitor,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::GroupMember => "group_member",
            Tier::User => "user",
            Tier::Visitor => "visitor",
        }
    }
}

/// Resolved facts the ladder decides on
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    /// Roles assigned to the actor on the entity
    pub assigned: &'a [Arc<Role>],
    pub actor_groups: &'a GroupSet,
    /// Groups shared by actor and entity
    pub common_groups: &'a GroupSet,
    pub authenticated: bool,
}

impl DecisionInputs<'_> {
    pub fn is_member(&self) -> bool {
        !self.common_groups.is_empty()
    }

    pub fn is_visitor(&self) -> bool {
        !self.authenticated
    }

    pub fn tier(&self) -> Tier {
        if self.is_member() {
            Tier::GroupMember
        } else if self.authenticated {
            Tier::User
        } else {
            Tier::Visitor
        }
    }

    fn assigned_role_grants(&self, role_name: &str, operation: &str) -> bool {
        self.assigned.iter().any(|role| role.name() == role_name && role.grants(operation))
    }
}

/// Ladder clause that produced a grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSource {
    AssignedRole(String),
    GroupRole(String),
    GroupOverride(String),
    GroupMemberDefault,
    UserDefault,
    VisitorDefault,
}

/// A granted operation and the clause that granted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub operation: String,
    pub source: GrantSource,
}

/// Walk the precedence ladder over every implied operation
///
/// Returns `None` when nothing is granted, including when the profile makes
/// membership mandatory and the actor shares no group with the entity.
pub fn find_grant(profile: &PermissionProfile, implied: &BTreeSet<String>, inputs: &DecisionInputs<'_>) -> Option<Grant> {
    if profile.membership_mandatory() && !inputs.is_member() {
        return None;
    }

    let group_roles: Vec<(&String, Arc<Role>)> = inputs
        .common_groups
        .iter()
        .filter_map(|group| profile.role(&group_role_name(group)).map(|role| (group, role)))
        .collect();

    implied.iter().find_map(|operation| grant_source(profile, &group_roles, operation, inputs).map(|source| Grant { operation: operation.clone(), source }))
}

fn grant_source(profile: &PermissionProfile, group_roles: &[(&String, Arc<Role>)], operation: &str, inputs: &DecisionInputs<'_>) -> Option<GrantSource> {
    if let Some(role) = inputs.assigned.iter().find(|role| role.grants(operation)) {
        return Some(GrantSource::AssignedRole(role.name().to_string()));
    }

    if let Some((group, _)) = group_roles.iter().find(|(_, role)| role.grants(operation)) {
        return Some(GrantSource::GroupRole(group.to_string()));
    }

    if let Some(group) = inputs
        .actor_groups
        .iter()
        .find(|group| profile.group_override_ops(group).is_some_and(|ops| ops.contains(operation)))
    {
        return Some(GrantSource::GroupOverride(group.clone()));
    }

    if inputs.is_member() && (profile.default_group_member_ops().contains(operation) || inputs.assigned_role_grants(GROUP_MEMBER_ROLE, operation)) {
        return Some(GrantSource::GroupMemberDefault);
    }

    if inputs.authenticated && (profile.default_user_ops().contains(operation) || inputs.assigned_role_grants(USER_ROLE, operation)) {
        return Some(GrantSource::UserDefault);
    }

    if inputs.is_visitor() && (profile.default_visitor_ops().contains(operation) || inputs.assigned_role_grants(VISITOR_ROLE, operation)) {
        return Some(GrantSource::VisitorDefault);
    }

    None
}
