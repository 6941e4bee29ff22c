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

//! Role definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Prefix of profile roles granted to members of a specific group, e.g. `MemberOfIRS`
pub const GROUP_ROLE_PREFIX: &str = "MemberOf";

/// Assigned role name consulted for the group-member tier
pub const GROUP_MEMBER_ROLE: &str = "GroupMember";

/// Assigned role name consulted for the authenticated-user tier
pub const USER_ROLE: &str = "User";

/// Assigned role name consulted for the visitor tier
pub const VISITOR_ROLE: &str = "Visitor";

/// Name of the profile role that grants operations to members of `group`
pub fn group_role_name(group: &str) -> String {
    format!("{}{}", GROUP_ROLE_PREFIX, group)
}

/// A named bundle of operations scoped to one entity type
///
/// Roles are immutable once built. Changing a role means registering a new one
/// under the same name, which replaces the previous registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    name: String,
    operations: BTreeSet<String>,
    entity_type: String,
}

impl Role {
    /// Create a new role
    pub fn new<I, S>(name: impl Into<String>, operations: I, entity_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            operations: operations.into_iter().map(Into::into).collect(),
            entity_type: entity_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &BTreeSet<String> {
        &self.operations
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Whether `operation` is listed in this role
    pub fn grants(&self, operation: &str) -> bool {
        self.operations.contains(operation)
    }

    /// Registry key used by stores, `"{entity_type}.{name}"`
    pub fn key(&self) -> String {
        format!("{}.{}", self.entity_type, self.name)
    }
}
