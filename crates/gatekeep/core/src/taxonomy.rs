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

//! Operation taxonomy
//!
//! Operations form a hierarchy in which granting an operation also grants every
//! operation below it. The hierarchy is written as a nested [`OperationTree`] and
//! compiled once into an [`OperationTaxonomy`], which maps each operation to the
//! set of operations whose grant implies it.
//!
//! A name may appear under several parents (`ReadCommon` sits under both
//! `WriteCommon` and `ReadDeep` in the standard tree). Every occurrence
//! contributes its root path to the name's ancestor set.

use crate::error::{GatekeepError, GatekeepResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Nested literal form of an operation hierarchy
///
/// Serializes as nested JSON objects, e.g. `{"Admin": {"Manage": {}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationTree {
    children: BTreeMap<String, OperationTree>,
}

impl OperationTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// A node without children
    pub fn leaf() -> Self {
        Self::default()
    }

    /// Create a tree from its direct children
    pub fn from_children(children: BTreeMap<String, OperationTree>) -> Self {
        Self { children }
    }

    /// Parse a tree from nested JSON objects
    pub fn from_json(json: &str) -> GatekeepResult<Self> {
        serde_json::from_str(json).map_err(|e| GatekeepError::InvalidTaxonomy { message: e.to_string() })
    }

    /// Add a child, builder style
    pub fn with(mut self, name: impl Into<String>, subtree: OperationTree) -> Self {
        self.children.insert(name.into(), subtree);
        self
    }

    /// Insert or replace a child, returning the previous subtree
    pub fn insert(&mut self, name: impl Into<String>, subtree: OperationTree) -> Option<OperationTree> {
        self.children.insert(name.into(), subtree)
    }

    /// Remove a direct child
    pub fn remove(&mut self, name: &str) -> Option<OperationTree> {
        self.children.remove(name)
    }

    /// Direct child by name
    pub fn get(&self, name: &str) -> Option<&OperationTree> {
        self.children.get(name)
    }

    /// First occurrence of `name` anywhere below this node, depth first
    pub fn find_mut(&mut self, name: &str) -> Option<&mut OperationTree> {
        if self.children.contains_key(name) {
            return self.children.get_mut(name);
        }
        self.children.values_mut().find_map(|child| child.find_mut(name))
    }

    /// Direct children
    pub fn children(&self) -> impl Iterator<Item = (&str, &OperationTree)> {
        self.children.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The default hierarchy shipped with the engine
    pub fn standard() -> Self {
        let leaf = OperationTree::leaf;

        let trade = OperationTree::new()
            .with("AcceptPayment", OperationTree::new().with("Sell", OperationTree::new().with("Loan", leaf()).with("Rent", leaf())))
            .with("Buy", OperationTree::new().with("Lease", leaf()).with("Pay", leaf()).with("Order", leaf()));

        let execute = OperationTree::new().with("GenericAction", leaf()).with("Trade", trade);

        let eject = OperationTree::new().with("Invite", OperationTree::new().with("Join", OperationTree::new().with("Leave", leaf())));

        let disable = OperationTree::new().with("Ban", OperationTree::new().with("Suspend", OperationTree::new().with("Warn", leaf()).with("Flag", leaf())));

        let write_anything = OperationTree::new()
            .with("WriteCommon", OperationTree::new().with("ReadCommon", leaf()))
            .with(
                "ReadAnything",
                OperationTree::new().with("ReadDeep", OperationTree::new().with("ReadCommon", OperationTree::new().with("ReadHeadline", leaf()))),
            );

        let add_stuff = OperationTree::new()
            .with("Comment", leaf())
            .with("Rate", OperationTree::new().with("DownVote", OperationTree::new().with("UpVote", leaf())))
            .with("DetachItem", OperationTree::new().with("AttachItem", leaf()));

        let delete = OperationTree::new().with("EditAnything", OperationTree::new().with("WriteAnything", write_anything).with("AddStuff", add_stuff));

        let power_user = OperationTree::new().with("Execute", execute).with("Eject", eject).with("Disable", disable).with("Delete", delete);

        let admin = OperationTree::new()
            .with("AddAdmin", OperationTree::new().with("ChangePermissions", leaf()))
            .with(
                "DeleteDatabase",
                OperationTree::new().with("ManageDatabase", OperationTree::new().with("ManageUsers", OperationTree::new().with("SendMessage", leaf()))),
            )
            .with("Manage", OperationTree::new().with("PowerUser", power_user));

        OperationTree::new().with("Admin", admin)
    }
}

/// Compiled operation hierarchy with memoized implication closures
#[derive(Debug, Clone)]
pub struct OperationTaxonomy {
    /// Every name seen on the root path of every occurrence of an operation
    ancestors: HashMap<String, BTreeSet<String>>,

    /// `{op} ∪ ancestors(op) ∪ closure(each ancestor)`
    closures: HashMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl OperationTaxonomy {
    /// Compile a tree, rejecting hierarchies in which an operation implies itself through a cycle
    pub fn build(tree: &OperationTree) -> GatekeepResult<Self> {
        let mut ancestors = HashMap::new();
        let mut path = Vec::new();
        Self::collect(tree, &mut path, &mut ancestors);

        let mut closures = HashMap::with_capacity(ancestors.len());
        let mut state = HashMap::with_capacity(ancestors.len());
        let names: Vec<String> = ancestors.keys().cloned().collect();
        for name in &names {
            Self::close(name, &ancestors, &mut closures, &mut state)?;
        }

        Ok(Self { ancestors, closures })
    }

    /// The standard hierarchy, compiled
    pub fn standard() -> GatekeepResult<Self> {
        Self::build(&OperationTree::standard())
    }

    fn collect(node: &OperationTree, path: &mut Vec<String>, ancestors: &mut HashMap<String, BTreeSet<String>>) {
        for (name, children) in node.children() {
            ancestors.entry(name.to_string()).or_default().extend(path.iter().cloned());

            if !children.is_leaf() {
                path.push(name.to_string());
                Self::collect(children, path, ancestors);
                path.pop();
            }
        }
    }

    fn close(
        name: &str,
        ancestors: &HashMap<String, BTreeSet<String>>,
        closures: &mut HashMap<String, BTreeSet<String>>,
        state: &mut HashMap<String, Visit>,
    ) -> GatekeepResult<()> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => return Err(GatekeepError::CyclicTaxonomy { operation: name.to_string() }),
            None => {}
        }
        state.insert(name.to_string(), Visit::InProgress);

        let mut closure = BTreeSet::from([name.to_string()]);
        if let Some(direct) = ancestors.get(name) {
            for ancestor in direct {
                Self::close(ancestor, ancestors, closures, state)?;
                if let Some(inherited) = closures.get(ancestor) {
                    closure.extend(inherited.iter().cloned());
                }
            }
        }

        closures.insert(name.to_string(), closure);
        state.insert(name.to_string(), Visit::Done);
        Ok(())
    }

    /// Whether the operation is declared
    pub fn find(&self, operation: &str) -> bool {
        self.ancestors.contains_key(operation)
    }

    /// Operations whose grant implies `operation`, including `operation` itself
    pub fn expand(&self, operation: &str) -> GatekeepResult<&BTreeSet<String>> {
        self.closures.get(operation).ok_or_else(|| GatekeepError::UndefinedOperation {
            operation: operation.to_string(),
        })
    }

    /// Ancestor names collected from every occurrence of `operation`
    pub fn ancestors(&self, operation: &str) -> Option<&BTreeSet<String>> {
        self.ancestors.get(operation)
    }

    /// Whether a grant of `granted` covers a request for `requested`
    pub fn covers(&self, granted: &str, requested: &str) -> bool {
        self.closures.get(requested).is_some_and(|closure| closure.contains(granted))
    }

    /// All declared operation names
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.ancestors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }
}
