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

//! Group membership specifiers for actors and entities

use crate::error::GatekeepResult;
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by deferred group providers
pub type GroupFuture = BoxFuture<'static, GatekeepResult<Vec<String>>>;

/// Resolved, deduplicated group ids
pub type GroupSet = BTreeSet<String>;

/// Group membership given directly or through a provider
#[derive(Clone, Default)]
pub enum GroupSpecifier {
    #[default]
    None,
    Single(String),
    Many(Vec<String>),
    /// Synchronous provider
    Provider(Arc<dyn Fn() -> Vec<String> + Send + Sync>),
    /// Asynchronous provider, awaited during resolution
    Deferred(Arc<dyn Fn() -> GroupFuture + Send + Sync>),
}

impl GroupSpecifier {
    pub fn single(group: impl Into<String>) -> Self {
        GroupSpecifier::Single(group.into())
    }

    pub fn many<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupSpecifier::Many(groups.into_iter().map(Into::into).collect())
    }

    pub fn provider<F>(provider: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        GroupSpecifier::Provider(Arc::new(provider))
    }

    pub fn deferred<F, Fut>(provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatekeepResult<Vec<String>>> + Send + 'static,
    {
        GroupSpecifier::Deferred(Arc::new(move || provider().boxed()))
    }

    /// Resolve to a deduplicated set; provider errors propagate unchanged
    pub async fn resolve(&self) -> GatekeepResult<GroupSet> {
        let groups = match self {
            GroupSpecifier::None => return Ok(GroupSet::new()),
            GroupSpecifier::Single(group) => vec![group.clone()],
            GroupSpecifier::Many(groups) => groups.clone(),
            GroupSpecifier::Provider(provider) => provider(),
            GroupSpecifier::Deferred(provider) => provider().await?,
        };

        Ok(groups.into_iter().filter(|g| !g.is_empty()).collect())
    }
}

impl From<&str> for GroupSpecifier {
    fn from(group: &str) -> Self {
        GroupSpecifier::single(group)
    }
}

impl From<String> for GroupSpecifier {
    fn from(group: String) -> Self {
        GroupSpecifier::Single(group)
    }
}

impl From<Vec<String>> for GroupSpecifier {
    fn from(groups: Vec<String>) -> Self {
        GroupSpecifier::Many(groups)
    }
}

impl From<Vec<&str>> for GroupSpecifier {
    fn from(groups: Vec<&str>) -> Self {
        GroupSpecifier::many(groups)
    }
}

impl fmt::Debug for GroupSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupSpecifier::None => f.write_str("None"),
            GroupSpecifier::Single(group) => f.debug_tuple("Single").field(group).finish(),
            GroupSpecifier::Many(groups) => f.debug_tuple("Many").field(groups).finish(),
            GroupSpecifier::Provider(_) => f.write_str("Provider(..)"),
            GroupSpecifier::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Groups present in both sets
pub fn common_groups(actor_groups: &GroupSet, entity_groups: &GroupSet) -> GroupSet {
    actor_groups.intersection(entity_groups).cloned().collect()
}
