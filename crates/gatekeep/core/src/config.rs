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

//! Configuration management for the authorization engine

use std::env;
use std::time::Duration;

/// Configuration for an [`AuthorizationEngine`](crate::engine::AuthorizationEngine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of ancestor hops a single decision may follow
    pub max_ancestor_depth: usize,

    /// Decisions slower than this are logged as warnings
    pub slow_decision_threshold: Duration,

    /// Record decisions and role mutations in the audit log
    pub audit_enabled: bool,

    /// Maximum number of audit events kept in memory
    pub audit_max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: 16,
            slow_decision_threshold: Duration::from_millis(5),
            audit_enabled: true,
            audit_max_events: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults
    /// for missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            max_ancestor_depth: lookup("GATEKEEP_MAX_ANCESTOR_DEPTH").and_then(|v| v.parse().ok()).unwrap_or(defaults.max_ancestor_depth),

            slow_decision_threshold: lookup("GATEKEEP_SLOW_DECISION_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.slow_decision_threshold),

            audit_enabled: lookup("GATEKEEP_AUDIT_ENABLED").and_then(|v| v.parse().ok()).unwrap_or(defaults.audit_enabled),

            audit_max_events: lookup("GATEKEEP_AUDIT_MAX_EVENTS").and_then(|v| v.parse().ok()).unwrap_or(defaults.audit_max_events),
        }
    }

    /// Set the ancestor depth limit
    pub fn with_max_ancestor_depth(mut self, depth: usize) -> Self {
        self.max_ancestor_depth = depth;
        self
    }

    /// Enable or disable the audit log
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }
}
