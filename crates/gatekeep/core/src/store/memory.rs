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

//! In-memory permission store

use crate::error::StoreResult;
use crate::role::Role;
use crate::store::{PermissionStore, RoleNameMap};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Permission store holding everything in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPermissionStore {
    /// entity id -> actor id -> role names
    assignments: Arc<RwLock<BTreeMap<String, RoleNameMap>>>,

    /// `"{entity_type}.{role_name}"` -> definition
    role_registry: Arc<RwLock<HashMap<String, Role>>>,
}

impl MemoryPermissionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted role definition, if any
    pub async fn saved_role(&self, entity_type: &str, role_name: &str) -> Option<Role> {
        let registry = self.role_registry.read().await;
        registry.get(&format!("{}.{}", entity_type, role_name)).cloned()
    }

    /// Number of persisted role definitions
    pub async fn saved_role_count(&self) -> usize {
        self.role_registry.read().await.len()
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn assign_role(&self, entity_id: &str, actor_id: &str, role_name: &str) -> StoreResult<()> {
        let mut assignments = self.assignments.write().await;
        assignments
            .entry(entity_id.to_string())
            .or_default()
            .entry(actor_id.to_string())
            .or_default()
            .push(role_name.to_string());

        debug!(entity_id = %entity_id, actor_id = %actor_id, role = %role_name, "Assignment stored");
        Ok(())
    }

    async fn remove_role(&self, entity_id: &str, actor_id: &str, role_name: &str) -> StoreResult<()> {
        let mut assignments = self.assignments.write().await;

        let Some(entity_entry) = assignments.get_mut(entity_id) else {
            return Ok(());
        };
        let Some(role_names) = entity_entry.get_mut(actor_id) else {
            return Ok(());
        };
        if let Some(pos) = role_names.iter().position(|name| name == role_name) {
            role_names.remove(pos);
        }

        if role_names.is_empty() {
            entity_entry.remove(actor_id);
        }
        if entity_entry.is_empty() {
            assignments.remove(entity_id);
        }
        Ok(())
    }

    async fn get_role_names(&self, actor_id: &str, entity_id: &str) -> StoreResult<Vec<String>> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(entity_id).and_then(|entry| entry.get(actor_id)).cloned().unwrap_or_default())
    }

    async fn save_role(&self, entity_type: &str, role: &Role) -> StoreResult<()> {
        let mut registry = self.role_registry.write().await;
        registry.insert(format!("{}.{}", entity_type, role.name()), role.clone());
        Ok(())
    }

    async fn delete_role(&self, role_name: &str, entity_type: &str) -> StoreResult<()> {
        let mut registry = self.role_registry.write().await;
        registry.remove(&format!("{}.{}", entity_type, role_name));
        Ok(())
    }

    async fn get_role_owners(&self, entity_id: &str) -> StoreResult<RoleNameMap> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(entity_id).cloned().unwrap_or_default())
    }

    async fn get_actor_roles(&self, actor_id: &str, skip: usize, limit: usize) -> StoreResult<RoleNameMap> {
        let assignments = self.assignments.read().await;

        Ok(assignments
            .iter()
            .filter_map(|(entity_id, actors)| {
                actors
                    .get(actor_id)
                    .filter(|names| !names.is_empty())
                    .map(|names| (entity_id.clone(), names.clone()))
            })
            .skip(skip)
            .take(limit)
            .collect())
    }
}
