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

//! Actor and managed-entity contracts
//!
//! Hosts implement [`Actor`] for whoever performs an operation and
//! [`ManagedEntity`] for whatever it is performed on. Only the identifiers
//! are required; groups, profile, custom decision and ancestor are optional
//! capabilities with empty defaults.

use crate::decision::CustomDecision;
use crate::error::GatekeepResult;
use crate::groups::GroupSpecifier;
use crate::profile::ProfileSource;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Someone acting on an entity; an actor without an id is a visitor
pub trait Actor: Send + Sync {
    fn id(&self) -> Option<&str>;

    fn groups(&self) -> GroupSpecifier {
        GroupSpecifier::None
    }

    /// Id of an authenticated actor; empty ids count as absent
    fn authenticated_id(&self) -> Option<&str> {
        self.id().filter(|id| !id.is_empty())
    }

    fn is_visitor(&self) -> bool {
        self.authenticated_id().is_none()
    }
}

/// Plain actor value
#[derive(Debug, Clone, Default)]
pub struct ActorRecord {
    id: Option<String>,
    groups: GroupSpecifier,
}

impl ActorRecord {
    /// Create an authenticated actor
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            groups: GroupSpecifier::None,
        }
    }

    /// Create an unauthenticated actor
    pub fn visitor() -> Self {
        Self::default()
    }

    /// Set group membership
    pub fn with_groups(mut self, groups: impl Into<GroupSpecifier>) -> Self {
        self.groups = groups.into();
        self
    }
}

impl Actor for ActorRecord {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn groups(&self) -> GroupSpecifier {
        self.groups.clone()
    }
}

/// Something whose access is governed by the engine
#[async_trait]
pub trait ManagedEntity: Send + Sync {
    fn id(&self) -> &str;

    /// Entity type; selects the type-level profile and custom decision
    fn type_name(&self) -> &str;

    fn group_ids(&self) -> GroupSpecifier {
        GroupSpecifier::None
    }

    /// Instance-level profile, taking precedence over the type's profile
    fn profile(&self) -> Option<ProfileSource> {
        None
    }

    /// Instance-level custom decision, taking precedence over the type-level one
    fn custom_decision(&self) -> Option<Arc<dyn CustomDecision>> {
        None
    }

    /// Entity whose permissions apply when this one grants nothing
    async fn ancestor(&self) -> GatekeepResult<Option<Arc<dyn ManagedEntity>>> {
        Ok(None)
    }
}

/// Plain entity value for virtual entities such as "the system" or "the back office"
#[derive(Clone)]
pub struct EntityRecord {
    id: String,
    type_name: String,
    groups: GroupSpecifier,
    profile: Option<ProfileSource>,
    custom_decision: Option<Arc<dyn CustomDecision>>,
    ancestor: Option<Arc<dyn ManagedEntity>>,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            groups: GroupSpecifier::None,
            profile: None,
            custom_decision: None,
            ancestor: None,
        }
    }

    pub fn with_groups(mut self, groups: impl Into<GroupSpecifier>) -> Self {
        self.groups = groups.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<ProfileSource>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_custom_decision(mut self, decision: Arc<dyn CustomDecision>) -> Self {
        self.custom_decision = Some(decision);
        self
    }

    pub fn with_ancestor(mut self, ancestor: Arc<dyn ManagedEntity>) -> Self {
        self.ancestor = Some(ancestor);
        self
    }
}

#[async_trait]
impl ManagedEntity for EntityRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn group_ids(&self) -> GroupSpecifier {
        self.groups.clone()
    }

    fn profile(&self) -> Option<ProfileSource> {
        self.profile.clone()
    }

    fn custom_decision(&self) -> Option<Arc<dyn CustomDecision>> {
        self.custom_decision.clone()
    }

    async fn ancestor(&self) -> GatekeepResult<Option<Arc<dyn ManagedEntity>>> {
        Ok(self.ancestor.clone())
    }
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("groups", &self.groups)
            .field("profile", &self.profile)
            .field("custom_decision", &self.custom_decision.is_some())
            .field("ancestor", &self.ancestor.as_ref().map(|a| a.id().to_string()))
            .finish()
    }
}
