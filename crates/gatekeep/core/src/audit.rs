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

//! Audit logging for decisions and role mutations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    /// Access decision evaluated
    Decision,
    /// Role registered on an entity type
    RoleCreated,
    /// Role removed from an entity type
    RoleDeleted,
    /// Role assigned to an actor on an entity
    RoleAssigned,
    /// Role assignment removed
    RoleRevoked,
    /// Profile registered for an entity type
    ProfileRegistered,
}

/// Audit event result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
}

/// Audit event entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    pub event_type: AuditEventType,

    pub timestamp: DateTime<Utc>,

    /// Acting actor; `None` for visitors and engine-initiated events
    pub actor: Option<String>,

    pub entity_type: Option<String>,

    pub entity_id: Option<String>,

    pub operation: Option<String>,

    pub result: AuditResult,

    /// Caller-supplied decision context
    pub context: Option<serde_json::Value>,

    /// Additional event details
    pub details: HashMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: AuditEventType, actor: Option<String>, result: AuditResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            actor,
            entity_type: None,
            entity_id: None,
            operation: None,
            result,
            context: None,
            details: HashMap::new(),
        }
    }

    /// Set the target entity
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_context(mut self, context: Option<serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    /// Add detail
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Bounded in-memory audit log
#[derive(Debug)]
pub struct AuditLogger {
    events: RwLock<VecDeque<AuditEvent>>,

    /// Maximum number of events to keep in memory
    max_events: usize,

    enabled: bool,
}

impl AuditLogger {
    /// Create an audit logger keeping the last 10k events
    pub fn new() -> Self {
        Self::with_max_events(10_000)
    }

    /// Create audit logger with custom max events
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events,
            enabled: true,
        }
    }

    /// A logger that records nothing
    pub fn disabled() -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: 0,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log an audit event
    pub async fn log_event(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        // Denials are routine outcomes; only failures warrant a warning
        match event.result {
            AuditResult::Success | AuditResult::Denied => {
                info!(
                    event_type = ?event.event_type,
                    actor = ?event.actor,
                    entity_type = ?event.entity_type,
                    entity_id = ?event.entity_id,
                    operation = ?event.operation,
                    result = ?event.result,
                    "Audit event: {:?} - {:?}", event.event_type, event.result
                );
            }
            AuditResult::Failure => {
                warn!(
                    event_type = ?event.event_type,
                    actor = ?event.actor,
                    entity_type = ?event.entity_type,
                    entity_id = ?event.entity_id,
                    operation = ?event.operation,
                    result = ?event.result,
                    "Audit event: {:?} - {:?}", event.event_type, event.result
                );
            }
        }

        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Log an access decision
    pub async fn log_decision(&self, actor: Option<&str>, operation: &str, entity_type: &str, entity_id: &str, allowed: bool, context: Option<&serde_json::Value>) {
        let result = if allowed { AuditResult::Success } else { AuditResult::Denied };

        let event = AuditEvent::new(AuditEventType::Decision, actor.map(str::to_string), result)
            .with_entity(entity_type, entity_id)
            .with_operation(operation)
            .with_context(context.cloned());

        self.log_event(event).await;
    }

    /// Log role registration
    pub async fn log_role_created(&self, role_name: &str, entity_type: &str, operations: usize) {
        let event = AuditEvent::new(AuditEventType::RoleCreated, None, AuditResult::Success)
            .with_detail("role", role_name)
            .with_detail("entity_type", entity_type)
            .with_detail("operations", operations.to_string());

        self.log_event(event).await;
    }

    /// Log role deletion
    pub async fn log_role_deleted(&self, role_name: &str, entity_type: &str) {
        let event = AuditEvent::new(AuditEventType::RoleDeleted, None, AuditResult::Success)
            .with_detail("role", role_name)
            .with_detail("entity_type", entity_type);

        self.log_event(event).await;
    }

    /// Log role assignment
    pub async fn log_role_assigned(&self, actor_id: &str, role_name: &str, entity_type: &str, entity_id: &str) {
        let event = AuditEvent::new(AuditEventType::RoleAssigned, Some(actor_id.to_string()), AuditResult::Success)
            .with_entity(entity_type, entity_id)
            .with_detail("role", role_name);

        self.log_event(event).await;
    }

    /// Log role revocation
    pub async fn log_role_revoked(&self, actor_id: &str, role_name: &str, entity_type: &str, entity_id: &str) {
        let event = AuditEvent::new(AuditEventType::RoleRevoked, Some(actor_id.to_string()), AuditResult::Success)
            .with_entity(entity_type, entity_id)
            .with_detail("role", role_name);

        self.log_event(event).await;
    }

    /// Log profile registration
    pub async fn log_profile_registered(&self, entity_type: &str) {
        let event = AuditEvent::new(AuditEventType::ProfileRegistered, None, AuditResult::Success).with_detail("entity_type", entity_type);

        self.log_event(event).await;
    }

    /// Most recent events first
    pub async fn get_events(&self, limit: Option<usize>) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events.iter().rev().take(limit.unwrap_or(usize::MAX)).cloned().collect()
    }

    /// Events performed by an actor, most recent first
    pub async fn get_actor_events(&self, actor_id: &str, limit: Option<usize>) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .rev()
            .filter(|event| event.actor.as_deref() == Some(actor_id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Events by type, most recent first
    pub async fn get_events_by_type(&self, event_type: AuditEventType, limit: Option<usize>) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .rev()
            .filter(|event| event.event_type == event_type)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Clear all audit events
    pub async fn clear_events(&self) {
        let mut events = self.events.write().await;
        events.clear();

        info!("Audit log cleared");
    }

    /// Get audit statistics
    pub async fn get_statistics(&self) -> AuditStatistics {
        let events = self.events.read().await;

        let mut stats = AuditStatistics {
            total_events: events.len(),
            ..AuditStatistics::default()
        };

        for event in events.iter() {
            match event.result {
                AuditResult::Success => stats.successful_events += 1,
                AuditResult::Failure => stats.failed_events += 1,
                AuditResult::Denied => stats.denied_events += 1,
            }

            *stats.events_by_type.entry(event.event_type).or_insert(0) += 1;
        }

        stats
    }
}

/// Audit statistics
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_events: usize,

    pub successful_events: usize,

    pub failed_events: usize,

    pub denied_events: usize,

    pub events_by_type: HashMap<AuditEventType, usize>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
