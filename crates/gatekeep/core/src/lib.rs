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

//! Gatekeep authorization core
//!
//! This crate decides whether an actor may perform an operation on a managed
//! entity. Operations form a hierarchy in which a broad grant implies every
//! narrower one; each entity type carries a permission profile with tier
//! defaults, group overrides and named roles; assignments live behind a
//! pluggable [`PermissionStore`].

pub mod audit;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod groups;
pub mod profile;
pub mod role;
pub mod store;
pub mod subject;
pub mod taxonomy;

pub use audit::{AuditEvent, AuditEventType, AuditLogger, AuditResult, AuditStatistics};
pub use config::EngineConfig;
pub use decision::{CustomDecision, DecisionRequest, Grant, GrantSource, Tier};
pub use engine::{AuthorizationEngine, EngineBuilder};
pub use error::{GatekeepError, GatekeepResult, StoreError, StoreResult};
pub use groups::{GroupSet, GroupSpecifier};
pub use profile::{PermissionProfile, ProfileDefinition, ProfileSource};
pub use role::Role;
pub use store::{MemoryPermissionStore, PermissionStore, RoleNameMap};
pub use subject::{Actor, ActorRecord, EntityRecord, ManagedEntity};
pub use taxonomy::{OperationTaxonomy, OperationTree};
