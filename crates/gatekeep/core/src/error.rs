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

//! Error types for the authorization engine
//!
//! Two families live here. Configuration errors point at a setup defect (an
//! operation missing from the taxonomy, a profile naming an unknown operation,
//! an unbounded ancestor chain) and are raised at the point of use. Access
//! denial is not an error for `is_allowed`; only `test` turns it into
//! [`GatekeepError::AccessDenied`].

use thiserror::Error;

/// Errors raised by a [`PermissionStore`](crate::store::PermissionStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store backend error: {message}")]
    Backend { message: String },

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Engine error type
#[derive(Error, Debug)]
pub enum GatekeepError {
    #[error("Operation {operation} is not defined. Consider adding it to the operations taxonomy")]
    UndefinedOperation { operation: String },

    #[error("Profile {profile} references operation {operation} which is not in the taxonomy")]
    InvalidProfile { profile: String, operation: String },

    #[error("Operation {operation} is its own ancestor in the taxonomy")]
    CyclicTaxonomy { operation: String },

    #[error("Invalid taxonomy: {message}")]
    InvalidTaxonomy { message: String },

    #[error("Invalid registration: {message}")]
    InvalidRegistration { message: String },

    #[error("Role {role} is not registered for entity type {entity_type}")]
    UnknownRole { role: String, entity_type: String },

    #[error("Cannot {action} for an unauthenticated actor")]
    AnonymousActor { action: String },

    #[error("Ancestor chain of entity {entity_id} exceeds the maximum depth of {limit}")]
    AncestorDepthExceeded { entity_id: String, limit: usize },

    #[error("Ancestor chain revisits entity {type_name}:{entity_id}")]
    AncestorCycle { type_name: String, entity_id: String },

    #[error("{} attempted unprivileged operation {operation} on {entity_id} with {}", .actor_id.as_deref().unwrap_or("visitor"), render_context(.context))]
    AccessDenied {
        actor_id: Option<String>,
        operation: String,
        entity_id: String,
        context: Option<serde_json::Value>,
    },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn render_context(context: &Option<serde_json::Value>) -> String {
    match context {
        Some(value) => value.to_string(),
        None => "\"\"".to_string(),
    }
}

impl GatekeepError {
    /// Whether this error signals a setup or programming defect rather than a runtime condition
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            GatekeepError::UndefinedOperation { .. }
                | GatekeepError::InvalidProfile { .. }
                | GatekeepError::CyclicTaxonomy { .. }
                | GatekeepError::InvalidTaxonomy { .. }
                | GatekeepError::InvalidRegistration { .. }
                | GatekeepError::UnknownRole { .. }
                | GatekeepError::AnonymousActor { .. }
                | GatekeepError::AncestorDepthExceeded { .. }
                | GatekeepError::AncestorCycle { .. }
        )
    }

    /// Whether this error is the `test` form of a denied decision
    pub fn is_access_denied(&self) -> bool {
        matches!(self, GatekeepError::AccessDenied { .. })
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GatekeepError::UndefinedOperation { .. } => "undefined_operation",
            GatekeepError::InvalidProfile { .. } => "invalid_profile",
            GatekeepError::CyclicTaxonomy { .. } => "cyclic_taxonomy",
            GatekeepError::InvalidTaxonomy { .. } => "invalid_taxonomy",
            GatekeepError::InvalidRegistration { .. } => "invalid_registration",
            GatekeepError::UnknownRole { .. } => "unknown_role",
            GatekeepError::AnonymousActor { .. } => "anonymous_actor",
            GatekeepError::AncestorDepthExceeded { .. } => "ancestor_depth_exceeded",
            GatekeepError::AncestorCycle { .. } => "ancestor_cycle",
            GatekeepError::AccessDenied { .. } => "access_denied",
            GatekeepError::Provider { .. } => "provider_error",
            GatekeepError::Store(_) => "store_error",
        }
    }
}

/// Result type for engine operations
pub type GatekeepResult<T> = Result<T, GatekeepError>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
