//! The registration tree.
//!
//! # Purpose
//!
//! - Owns the root registration, the [`RegistryConfig`] and the access policy.
//! - Exposes address-level mutation entry points on top of the per-node
//!   [`ResourceRegistration`] handles.
//!
//! # Mental model
//!
//! Every node keeps its content in an immutable snapshot. Readers load snapshots
//! without locking; writers copy the snapshot of the one node they change and swap
//! the copy in. New subtrees are assembled off-tree, populated by their definitions
//! and attached with one swap on the deepest existing ancestor.
//!
//! # Invariants
//!
//! - Every path from the root reaches a node at most once; the tree owns its nodes
//!   and nodes only hold weak back references.
//! - A failed registration publishes nothing.
//! - A removed subtree is sealed: every later mutation through it fails with
//!   [`RegistryError::Removed`].
//!
//! # Concurrency
//!
//! Writers on disjoint nodes never contend. Writers on the same node retry their
//! compare-and-swap; none of them blocks readers.

mod node;
mod registration;

use std::sync::Arc;

use keel_address::{PathAddress, PathElement};
pub(crate) use node::{Node, NodeState};
pub use registration::ResourceRegistration;
use registration::{
	attach, attach_intermediate, check_accepts_child, check_depth, forbids_persisted_children, governing_child,
};

use crate::access::{self, Caller, Permission};
use crate::alias::AliasEntry;
use crate::config::RegistryConfig;
use crate::definition::{self, ResourceDefinition};
use crate::error::{IllegalStateReason, Registered, RegistryError};
use crate::proxy::SharedProxy;
use crate::resolve::{self, Resolution};
use crate::view::ReadView;

/// Name of the caller that runs the root definition's hooks.
const BOOTSTRAP_CALLER: &str = "bootstrap";

/// A management resource registry.
///
/// Cloning is cheap and yields another handle onto the same tree.
#[derive(Clone)]
pub struct ManagementRegistry {
	root: Arc<Node>,
	config: Arc<RegistryConfig>,
}

impl ManagementRegistry {
	/// Creates the root registration and runs `root_definition`'s hooks on it.
	pub fn new(root_definition: &dyn ResourceDefinition, config: RegistryConfig) -> Result<Self, RegistryError> {
		if let Some(element) = root_definition.path_element() {
			return Err(RegistryError::IllegalArgument(format!(
				"root definition cannot declare path element {element}"
			)));
		}
		let root = Node::root(NodeState::new(
			root_definition.description(),
			root_definition.is_runtime_only(),
		));
		let config = Arc::new(config);
		let registration = ResourceRegistration::new(root.clone(), config.clone(), Caller::privileged(BOOTSTRAP_CALLER));
		definition::populate(root_definition, &registration)?;
		tracing::debug!(
			enforce_access = config.enforce_access,
			max_alias_hops = config.max_alias_hops,
			"created management registry"
		);
		Ok(Self { root, config })
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// Handle onto the root registration acting as `caller`.
	pub fn root(&self, caller: &Caller) -> ResourceRegistration {
		ResourceRegistration::new(self.root.clone(), self.config.clone(), caller.clone())
	}

	/// Read capability acting as `caller`.
	pub fn read_view(&self, caller: &Caller) -> ReadView {
		ReadView::new(self.root.clone(), self.config.clone(), caller.clone())
	}

	/// Resolves `address` to the registration governing it.
	pub fn resolve(&self, caller: &Caller, address: &PathAddress) -> Result<Resolution, RegistryError> {
		access::require(&self.config, caller, Permission::Read)?;
		Ok(resolve::resolve(&self.root, &self.config, address))
	}

	/// Handle onto the registration governing `address`, see [`ResourceRegistration::sub_model`].
	pub fn registration(&self, caller: &Caller, address: &PathAddress) -> Result<Option<ResourceRegistration>, RegistryError> {
		self.root(caller).sub_model(address)
	}

	/// Registers `definition` at `address`, creating missing intermediate nodes.
	///
	/// The parent address is walked the way [`ResourceRegistration::sub_model`]
	/// picks registrations: an exact child, else the wildcard's override model for
	/// the value, else the wildcard itself. Bare intermediate nodes are created only
	/// where nothing governs an element, so they never hide a wildcard or an
	/// override. The new chain is validated, populated and published with a single
	/// swap, so a failure at any point leaves the tree as it was. When a concurrent
	/// writer registers one of the intermediates first, the registration is retried
	/// against the new tree and the definition's hooks run again.
	pub fn register_sub_model(
		&self,
		caller: &Caller,
		address: &PathAddress,
		definition: &dyn ResourceDefinition,
	) -> Result<ResourceRegistration, RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let Some(last) = address.last() else {
			return Err(RegistryError::IllegalArgument(
				"the root is registered when the registry is created".to_string(),
			));
		};
		check_depth(&self.config, address.len())?;
		match definition.path_element() {
			Some(element) if element == last => {}
			Some(element) => {
				return Err(RegistryError::IllegalArgument(format!(
					"definition for {element} cannot be registered at {address}"
				)));
			}
			None => {
				return Err(RegistryError::IllegalArgument(format!(
					"definition registered at {address} has no path element"
				)));
			}
		}

		loop {
			let (anchor, existing) = self.walk(&address.parent())?;
			if existing == address.len() - 1 {
				return ResourceRegistration::new(anchor, self.config.clone(), caller.clone()).register_sub_model(definition);
			}
			match self.graft(caller, anchor, address, existing, definition) {
				Err(RegistryError::DuplicateRegistration { address: clash, .. }) if clash.len() <= existing + 1 => {
					tracing::trace!(%address, "intermediate registered concurrently, retrying");
				}
				outcome => return outcome,
			}
		}
	}

	/// Builds the missing part of `address` beneath `anchor` (which sits at depth
	/// `existing`) and attaches it.
	fn graft(
		&self,
		caller: &Caller,
		anchor: Arc<Node>,
		address: &PathAddress,
		existing: usize,
		definition: &dyn ResourceDefinition,
	) -> Result<ResourceRegistration, RegistryError> {
		let anchor_state = anchor.load();
		let first = address.as_slice()[existing].clone();
		check_accepts_child(&anchor, &anchor_state, &first)?;
		let runtime_only = forbids_persisted_children(&anchor);
		if runtime_only && !definition.is_runtime_only() {
			return Err(RegistryError::illegal_state(
				anchor.address(),
				IllegalStateReason::PersistedBeneathRuntimeOnly,
			));
		}

		let top = Node::child_of(&anchor, first, NodeState::new("", runtime_only));
		let mut chain = vec![top.clone()];
		for element in &address.as_slice()[existing + 1..address.len() - 1] {
			let parent = chain.last().cloned().unwrap_or_else(|| top.clone());
			chain.push(Node::child_of(&parent, element.clone(), NodeState::new("", runtime_only)));
		}
		let parent = chain.last().cloned().unwrap_or_else(|| top.clone());
		let leaf_parent = ResourceRegistration::new(parent, self.config.clone(), caller.clone());
		let registration = leaf_parent.register_sub_model(definition)?;

		// link the off-tree intermediates bottom-up, then publish the top
		for pair in chain.windows(2).rev() {
			attach(&pair[0], pair[1].clone())?;
		}
		attach_intermediate(&anchor, top)?;
		tracing::debug!(%address, created = address.len() - existing - 1, "registered intermediate nodes");
		Ok(registration)
	}

	/// Follows `address` through the registrations governing each element. Returns
	/// the deepest node reached and how many elements it consumed.
	fn walk(&self, address: &PathAddress) -> Result<(Arc<Node>, usize), RegistryError> {
		let mut node = self.root.clone();
		for (depth, element) in address.iter().enumerate() {
			let state = node.load();
			match governing_child(&node, &state, element) {
				Some(child) => node = child,
				None => {
					check_accepts_child(&node, &state, element)?;
					return Ok((node, depth));
				}
			}
		}
		Ok((node, address.len()))
	}

	/// The node registered under the last element of `address`, or an error naming
	/// it as absent. Earlier elements may pass through wildcards and overrides; the
	/// last one must match exactly.
	fn literal(&self, address: &PathAddress, what: Registered) -> Result<Arc<Node>, RegistryError> {
		let (node, depth) = self.walk(address)?;
		if depth != address.len() {
			return Err(RegistryError::absent(&address.prefix(depth), what, address));
		}
		match address.last() {
			Some(last) if node.element() != Some(last) => Err(RegistryError::absent(&address.parent(), what, last)),
			_ => Ok(node),
		}
	}

	fn handle(&self, caller: &Caller, node: Arc<Node>) -> ResourceRegistration {
		ResourceRegistration::new(node, self.config.clone(), caller.clone())
	}

	fn split(address: &PathAddress) -> Result<(PathAddress, &PathElement), RegistryError> {
		match address.last() {
			Some(last) => Ok((address.parent(), last)),
			None => Err(RegistryError::IllegalArgument("the root cannot be unregistered".to_string())),
		}
	}

	/// Removes the registration at `address` and its whole subtree.
	pub fn unregister_sub_model(&self, caller: &Caller, address: &PathAddress) -> Result<(), RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let (parent, last) = Self::split(address)?;
		let parent = self.literal(&parent, Registered::Resource)?;
		self.handle(caller, parent).unregister_sub_model(last)
	}

	pub fn register_override_model(
		&self,
		caller: &Caller,
		wildcard_address: &PathAddress,
		name: &str,
		definition: &dyn ResourceDefinition,
	) -> Result<ResourceRegistration, RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let node = self.literal(wildcard_address, Registered::Resource)?;
		self.handle(caller, node).register_override_model(name, definition)
	}

	pub fn unregister_override_model(&self, caller: &Caller, wildcard_address: &PathAddress, name: &str) -> Result<(), RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let node = self.literal(wildcard_address, Registered::Resource)?;
		self.handle(caller, node).unregister_override_model(name)
	}

	/// Registers a proxy controller at `address`. The parent must already exist.
	pub fn register_proxy_controller(
		&self,
		caller: &Caller,
		address: &PathAddress,
		controller: SharedProxy,
	) -> Result<ResourceRegistration, RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let (parent, last) = Self::split(address)?;
		let parent = self.literal(&parent, Registered::Resource)?;
		self.handle(caller, parent).register_proxy_controller(last.clone(), controller)
	}

	pub fn unregister_proxy_controller(&self, caller: &Caller, address: &PathAddress) -> Result<(), RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let (parent, last) = Self::split(address)?;
		let parent = self.literal(&parent, Registered::Proxy)?;
		self.handle(caller, parent).unregister_proxy_controller(last)
	}

	/// Registers an alias at `address`. The parent must already exist.
	pub fn register_alias(
		&self,
		caller: &Caller,
		address: &PathAddress,
		alias: AliasEntry,
	) -> Result<ResourceRegistration, RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let (parent, last) = Self::split(address)?;
		let parent = self.literal(&parent, Registered::Resource)?;
		self.handle(caller, parent).register_alias(last.clone(), alias)
	}

	pub fn unregister_alias(&self, caller: &Caller, address: &PathAddress) -> Result<(), RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let (parent, last) = Self::split(address)?;
		let parent = self.literal(&parent, Registered::Alias)?;
		self.handle(caller, parent).unregister_alias(last)
	}

	pub fn set_runtime_only(&self, caller: &Caller, address: &PathAddress, runtime_only: bool) -> Result<(), RegistryError> {
		access::require(&self.config, caller, Permission::Access)?;
		let node = self.literal(address, Registered::Resource)?;
		self.handle(caller, node).set_runtime_only(runtime_only)
	}
}
