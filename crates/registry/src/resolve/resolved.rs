use std::collections::BTreeSet;
use std::fmt;
use std::iter;
use std::sync::Arc;

use indexmap::IndexSet;
use keel_address::PathAddress;

use crate::descriptor::{AttributeAccess, OperationEntry};
use crate::error::{Registered, RegistryError};
use crate::tree::{Node, NodeState, ResourceRegistration};

/// Override model layered over a wildcard registration during resolution.
#[derive(Clone)]
pub(crate) struct AppliedOverride {
	name: Arc<str>,
	node: Arc<Node>,
	state: Arc<NodeState>,
}

impl AppliedOverride {
	pub(crate) fn new(name: Arc<str>, node: Arc<Node>, state: Arc<NodeState>) -> Self {
		Self { name, node, state }
	}
}

/// A node on the resolved path together with the snapshot taken of it.
#[derive(Clone)]
pub(crate) struct PinnedNode {
	node: Arc<Node>,
	state: Arc<NodeState>,
	applied: Option<AppliedOverride>,
}

impl PinnedNode {
	pub(crate) fn new(node: Arc<Node>, state: Arc<NodeState>, applied: Option<AppliedOverride>) -> Self {
		Self { node, state, applied }
	}

	pub(crate) fn node(&self) -> &Arc<Node> {
		&self.node
	}

	pub(crate) fn state(&self) -> &Arc<NodeState> {
		&self.state
	}

	/// Override snapshot first, then the node's own.
	pub(crate) fn layers(&self) -> impl Iterator<Item = &NodeState> + Clone {
		self.applied
			.as_ref()
			.map(|applied| &*applied.state)
			.into_iter()
			.chain(iter::once(&*self.state))
	}

	fn inherited_operation(&self, name: &str) -> Option<&OperationEntry> {
		self.layers()
			.find_map(|state| state.operations.get(name).filter(|entry| entry.is_inherited()))
			.map(Arc::as_ref)
	}
}

/// The registration governing a resolved address.
///
/// Holds the snapshots taken while resolving, so every accessor answers from the
/// same consistent view even if the tree changes (or the registration is removed)
/// afterwards.
#[derive(Clone)]
pub struct ResolvedRegistration {
	address: PathAddress,
	/// Root first, excluding the leaf.
	ancestors: Vec<PinnedNode>,
	leaf: PinnedNode,
}

impl ResolvedRegistration {
	pub(crate) fn new(address: PathAddress, ancestors: Vec<PinnedNode>, leaf: PinnedNode) -> Self {
		Self {
			address,
			ancestors,
			leaf,
		}
	}

	pub(crate) fn leaf(&self) -> &PinnedNode {
		&self.leaf
	}

	/// The address that was resolved.
	pub fn address(&self) -> &PathAddress {
		&self.address
	}

	/// Address of the registration that served the request, `*` included when a
	/// wildcard registration matched. Differs from [`Self::address`] after an alias
	/// redirect too.
	pub fn registration_address(&self) -> &PathAddress {
		self.leaf.node.address()
	}

	/// Name of the override model applied to the wildcard registration, if any.
	pub fn override_name(&self) -> Option<&str> {
		self.leaf.applied.as_ref().map(|applied| &*applied.name)
	}

	pub fn description(&self) -> &str {
		match &self.leaf.applied {
			Some(applied) if !applied.state.description.is_empty() => &*applied.state.description,
			_ => &*self.leaf.state.description,
		}
	}

	/// Attribute registered on the governing registration (override model first).
	/// Attributes are never inherited.
	pub fn attribute(&self, name: &str) -> Option<&AttributeAccess> {
		self.leaf
			.layers()
			.find_map(|state| state.attributes.get(name))
			.map(Arc::as_ref)
	}

	pub fn require_attribute(&self, name: &str) -> Result<&AttributeAccess, RegistryError> {
		self.attribute(name)
			.ok_or_else(|| RegistryError::not_found(&self.address, Registered::Attribute, name))
	}

	pub fn attribute_names(&self) -> Vec<&str> {
		let names: IndexSet<&str> = self
			.leaf
			.layers()
			.flat_map(|state| state.attributes.keys().map(|name| &**name))
			.collect();
		names.into_iter().collect()
	}

	/// Operation visible at this address.
	///
	/// Looks at the override model, then the registration itself, then every
	/// ancestor from the nearest to the root, where only inherited entries count.
	pub fn operation(&self, name: &str) -> Option<&OperationEntry> {
		if let Some(entry) = self.leaf.layers().find_map(|state| state.operations.get(name)) {
			return Some(&**entry);
		}
		self.ancestors
			.iter()
			.rev()
			.find_map(|ancestor| ancestor.inherited_operation(name))
	}

	pub fn require_operation(&self, name: &str) -> Result<&OperationEntry, RegistryError> {
		self.operation(name)
			.ok_or_else(|| RegistryError::not_found(&self.address, Registered::Operation, name))
	}

	/// Names of the operations registered here, followed by inherited ones from
	/// the nearest ancestor outwards when `include_inherited` is set.
	pub fn operation_names(&self, include_inherited: bool) -> Vec<&str> {
		let mut names: IndexSet<&str> = self
			.leaf
			.layers()
			.flat_map(|state| state.operations.keys().map(|name| &**name))
			.collect();
		if include_inherited {
			for ancestor in self.ancestors.iter().rev() {
				for state in ancestor.layers() {
					names.extend(
						state
							.operations
							.iter()
							.filter(|(_, entry)| entry.is_inherited())
							.map(|(name, _)| &**name),
					);
				}
			}
		}
		names.into_iter().collect()
	}

	pub fn child_types(&self) -> Vec<&str> {
		let keys: BTreeSet<&str> = self
			.leaf
			.layers()
			.flat_map(|state| state.child_types.iter().map(|key| &**key))
			.collect();
		keys.into_iter().collect()
	}

	/// True if the registration or any registration above it is runtime-only.
	pub fn is_runtime_only(&self) -> bool {
		self.ancestors
			.iter()
			.chain(iter::once(&self.leaf))
			.any(|pinned| pinned.layers().any(|state| state.runtime_only))
	}

	/// True if `registration` is the registration (or applied override model) that
	/// served this resolution.
	pub fn is_same_node(&self, registration: &ResourceRegistration) -> bool {
		let node = registration.node();
		Arc::ptr_eq(&self.leaf.node, node)
			|| self
				.leaf
				.applied
				.as_ref()
				.is_some_and(|applied| Arc::ptr_eq(&applied.node, node))
	}
}

impl fmt::Debug for ResolvedRegistration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResolvedRegistration")
			.field("address", &self.address)
			.field("registration_address", self.registration_address())
			.field("override_name", &self.override_name())
			.finish_non_exhaustive()
	}
}
