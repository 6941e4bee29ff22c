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

//! Storage contract for role assignments and role definitions
//!
//! The engine owns no durable state. Role assignments and persisted role
//! definitions live behind [`PermissionStore`], implemented by the host.
//! [`MemoryPermissionStore`] is the reference implementation.

pub mod memory;

pub use memory::MemoryPermissionStore;

use crate::error::StoreResult;
use crate::profile::PermissionProfile;
use crate::role::Role;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Role names keyed by actor id or entity id
pub type RoleNameMap = BTreeMap<String, Vec<String>>;

/// Persistent backend for role assignments
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Persist an assignment; appending a duplicate is acceptable
    async fn assign_role(&self, entity_id: &str, actor_id: &str, role_name: &str) -> StoreResult<()>;

    /// Remove one assignment if present
    async fn remove_role(&self, entity_id: &str, actor_id: &str, role_name: &str) -> StoreResult<()>;

    /// Raw role names assigned to the actor on the entity
    async fn get_role_names(&self, actor_id: &str, entity_id: &str) -> StoreResult<Vec<String>>;

    /// Assigned roles resolved through the profile's registry
    ///
    /// Names with no registered role (renamed or deleted roles) are skipped.
    async fn get_roles_for_user(&self, actor_id: &str, entity_id: &str, profile: &PermissionProfile) -> StoreResult<Vec<Arc<Role>>> {
        let names = self.get_role_names(actor_id, entity_id).await?;
        let mut roles = Vec::with_capacity(names.len());

        for name in names {
            match profile.role(&name) {
                Some(role) => roles.push(role),
                None => warn!(
                    actor_id = %actor_id,
                    entity_id = %entity_id,
                    role = %name,
                    profile = %profile.type_name(),
                    "Ignoring assignment of unregistered role"
                ),
            }
        }

        Ok(roles)
    }

    /// Persist a role definition for introspection
    async fn save_role(&self, entity_type: &str, role: &Role) -> StoreResult<()>;

    /// Remove a role definition
    async fn delete_role(&self, role_name: &str, entity_type: &str) -> StoreResult<()>;

    /// Actor id to assigned role names on the entity
    async fn get_role_owners(&self, entity_id: &str) -> StoreResult<RoleNameMap>;

    /// Entity id to role names for the actor, over entities where the actor holds at least one role
    async fn get_actor_roles(&self, actor_id: &str, skip: usize, limit: usize) -> StoreResult<RoleNameMap>;
}
