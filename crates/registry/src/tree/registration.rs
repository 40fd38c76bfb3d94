use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use keel_address::{PathAddress, PathElement};

use super::node::{Node, NodeKind, NodeState, Terminal};
use crate::access::{self, Caller, Permission};
use crate::alias::AliasEntry;
use crate::config::RegistryConfig;
use crate::definition::{self, ResourceDefinition};
use crate::descriptor::{AttributeAccess, AttributeFlags, OperationEntry, SharedHandler};
use crate::error::{IllegalStateReason, Registered, RegistryError};
use crate::proxy::SharedProxy;

/// Handle onto one registration node.
///
/// Carries the [`Caller`] that obtained it; mutators check [`Permission::Access`]
/// against that caller before doing anything else. Handles stay valid after the node
/// is unregistered, but every mutation through them then fails with
/// [`RegistryError::Removed`].
#[derive(Clone)]
pub struct ResourceRegistration {
	node: Arc<Node>,
	config: Arc<RegistryConfig>,
	caller: Caller,
}

impl ResourceRegistration {
	pub(crate) fn new(node: Arc<Node>, config: Arc<RegistryConfig>, caller: Caller) -> Self {
		Self { node, config, caller }
	}

	pub(crate) fn node(&self) -> &Arc<Node> {
		&self.node
	}

	fn with_node(&self, node: Arc<Node>) -> Self {
		Self::new(node, self.config.clone(), self.caller.clone())
	}

	fn require(&self, permission: Permission) -> Result<(), RegistryError> {
		access::require(&self.config, &self.caller, permission)
	}

	pub fn caller(&self) -> &Caller {
		&self.caller
	}

	/// Address of this registration. Wildcard registrations carry `*` in their last
	/// element; override models carry the override name.
	pub fn address(&self) -> &PathAddress {
		self.node.address()
	}

	/// Enclosing registration. For an override model this is the parent of the
	/// wildcard registration it refines.
	pub fn parent(&self) -> Option<ResourceRegistration> {
		self.node.parent().map(|parent| self.with_node(parent))
	}

	/// Registers the resource `definition` describes as a direct child.
	///
	/// The definition's hooks run against the new registration before it is attached,
	/// so nothing becomes visible if any of them fails.
	pub fn register_sub_model(&self, definition: &dyn ResourceDefinition) -> Result<ResourceRegistration, RegistryError> {
		self.require(Permission::Access)?;
		let element = definition.path_element().cloned().ok_or_else(|| {
			RegistryError::IllegalArgument(format!(
				"sub-model definition registered beneath {} has no path element",
				self.address()
			))
		})?;
		check_depth(&self.config, self.address().len() + 1)?;
		check_accepts_child(&self.node, &self.node.load(), &element)?;
		if !definition.is_runtime_only() && forbids_persisted_children(&self.node) {
			return Err(RegistryError::illegal_state(
				self.address(),
				IllegalStateReason::PersistedBeneathRuntimeOnly,
			));
		}

		let child = Node::child_of(
			&self.node,
			element,
			NodeState::new(definition.description(), definition.is_runtime_only()),
		);
		let registration = self.with_node(child.clone());
		definition::populate(definition, &registration)?;
		attach(&self.node, child)?;

		tracing::debug!(address = %registration.address(), caller = self.caller.name(), "registered sub-model");
		Ok(registration)
	}

	/// Removes the direct child at `element` together with its whole subtree.
	pub fn unregister_sub_model(&self, element: &PathElement) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		let removed = self.node.update(|state| {
			state
				.remove_child(element)
				.ok_or_else(|| RegistryError::absent(self.address(), Registered::Resource, element))
		})?;
		removed.seal();
		tracing::debug!(address = %removed.address(), caller = self.caller.name(), "unregistered sub-model");
		Ok(())
	}

	/// Registers a named refinement of this wildcard registration.
	///
	/// Resolving `key=<name>` through this registration afterwards layers the
	/// override's attributes and operations over the wildcard's.
	pub fn register_override_model(
		&self,
		name: &str,
		definition: &dyn ResourceDefinition,
	) -> Result<ResourceRegistration, RegistryError> {
		self.require(Permission::Access)?;
		check_overridable(&self.node, &self.node.load())?;
		let element = self.override_element(name)?;
		if let Some(declared) = definition.path_element()
			&& declared != &element
		{
			return Err(RegistryError::IllegalArgument(format!(
				"override definition for {element} declares element {declared}"
			)));
		}

		let over = Node::override_of(
			&self.node,
			element,
			NodeState::new(definition.description(), definition.is_runtime_only()),
		);
		let registration = self.with_node(over.clone());
		definition::populate(definition, &registration)?;

		let key: Arc<str> = Arc::from(name);
		self.node.update(|state| {
			check_overridable(&self.node, state)?;
			if state.overrides.contains_key(name) {
				return Err(RegistryError::duplicate(self.address(), Registered::Override, name));
			}
			Arc::make_mut(&mut state.overrides).insert(key.clone(), over.clone());
			Ok(())
		})?;

		tracing::debug!(address = %registration.address(), caller = self.caller.name(), "registered override model");
		Ok(registration)
	}

	pub fn unregister_override_model(&self, name: &str) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		let removed = self.node.update(|state| {
			Arc::make_mut(&mut state.overrides)
				.remove(name)
				.ok_or_else(|| RegistryError::absent(self.address(), Registered::Override, name))
		})?;
		removed.seal();
		tracing::debug!(address = %removed.address(), caller = self.caller.name(), "unregistered override model");
		Ok(())
	}

	/// The override model registered under `name`, if any.
	pub fn override_model(&self, name: &str) -> Result<Option<ResourceRegistration>, RegistryError> {
		self.require(Permission::Read)?;
		Ok(self.node.load().overrides.get(name).map(|over| self.with_node(over.clone())))
	}

	/// Whether [`Self::register_override_model`] would be structurally accepted here.
	pub fn is_allows_override(&self) -> bool {
		check_overridable(&self.node, &self.node.load()).is_ok()
	}

	fn override_element(&self, name: &str) -> Result<PathElement, RegistryError> {
		let Some(element) = self.node.element() else {
			return Err(RegistryError::illegal_state(self.address(), IllegalStateReason::OverrideOnRoot));
		};
		if name == PathElement::WILDCARD_VALUE {
			return Err(RegistryError::IllegalArgument(format!(
				"'{name}' is not a valid override name at {}",
				self.address()
			)));
		}
		Ok(element.with_value(name)?)
	}

	/// Changes the reported runtime-only flag of this registration and its subtree.
	///
	/// Registrations beneath keep being accepted as before; only override models
	/// become illegal here while the flag is set.
	pub fn set_runtime_only(&self, runtime_only: bool) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		self.node.update(|state| {
			state.runtime_only = runtime_only;
			Ok(())
		})?;
		tracing::debug!(address = %self.address(), runtime_only, "updated runtime-only flag");
		Ok(())
	}

	pub fn register_attribute(&self, attribute: AttributeAccess) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		let name = attribute.shared_name();
		let attribute = Arc::new(attribute);
		self.node.update(|state| {
			if state.attributes.contains_key(&name) {
				return Err(RegistryError::duplicate(self.address(), Registered::Attribute, &*name));
			}
			Arc::make_mut(&mut state.attributes).insert(name.clone(), attribute.clone());
			Ok(())
		})?;
		tracing::debug!(address = %self.address(), attribute = %name, "registered attribute");
		Ok(())
	}

	pub fn register_read_only_attribute(
		&self,
		name: &str,
		read_handler: Option<SharedHandler>,
		flags: AttributeFlags,
	) -> Result<(), RegistryError> {
		self.register_attribute(AttributeAccess::read_only(name, read_handler, flags)?)
	}

	pub fn register_read_write_attribute(
		&self,
		name: &str,
		read_handler: Option<SharedHandler>,
		write_handler: SharedHandler,
		flags: AttributeFlags,
	) -> Result<(), RegistryError> {
		self.register_attribute(AttributeAccess::read_write(name, read_handler, write_handler, flags)?)
	}

	pub fn register_metric(&self, name: &str, metric_handler: SharedHandler, flags: AttributeFlags) -> Result<(), RegistryError> {
		self.register_attribute(AttributeAccess::metric(name, metric_handler, flags)?)
	}

	pub fn unregister_attribute(&self, name: &str) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		self.node.update(|state| {
			Arc::make_mut(&mut state.attributes)
				.shift_remove(name)
				.map(drop)
				.ok_or_else(|| RegistryError::absent(self.address(), Registered::Attribute, name))
		})?;
		tracing::debug!(address = %self.address(), attribute = name, "unregistered attribute");
		Ok(())
	}

	pub fn register_operation_handler(&self, entry: OperationEntry) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		let name = entry.shared_name();
		let entry = Arc::new(entry);
		self.node.update(|state| {
			if state.operations.contains_key(&name) {
				return Err(RegistryError::duplicate(self.address(), Registered::Operation, &*name));
			}
			Arc::make_mut(&mut state.operations).insert(name.clone(), entry.clone());
			Ok(())
		})?;
		tracing::debug!(address = %self.address(), operation = %name, "registered operation");
		Ok(())
	}

	pub fn unregister_operation_handler(&self, name: &str) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		self.node.update(|state| {
			Arc::make_mut(&mut state.operations)
				.shift_remove(name)
				.map(drop)
				.ok_or_else(|| RegistryError::absent(self.address(), Registered::Operation, name))
		})?;
		tracing::debug!(address = %self.address(), operation = name, "unregistered operation");
		Ok(())
	}

	/// Declares that children with `key` may exist here. Declaring a key twice is a no-op.
	pub fn register_child_type(&self, key: &str) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		PathElement::wildcard(key)?;
		let key: Arc<str> = Arc::from(key);
		self.node.update(|state| {
			Arc::make_mut(&mut state.child_types).insert(key.clone());
			Ok(())
		})
	}

	/// Hands everything at and beneath the child `element` to a remote controller.
	pub fn register_proxy_controller(
		&self,
		element: PathElement,
		controller: SharedProxy,
	) -> Result<ResourceRegistration, RegistryError> {
		self.require(Permission::Access)?;
		let registration = self.attach_terminal(element, Terminal::Proxy(controller))?;
		tracing::debug!(address = %registration.address(), caller = self.caller.name(), "registered proxy controller");
		Ok(registration)
	}

	pub fn unregister_proxy_controller(&self, element: &PathElement) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		self.detach_terminal(element, Registered::Proxy, |state| state.proxy().is_some())
	}

	/// Makes the child `element` an alias redirecting to `alias`'s target.
	pub fn register_alias(&self, element: PathElement, alias: AliasEntry) -> Result<ResourceRegistration, RegistryError> {
		self.require(Permission::Access)?;
		let address = self.address().append(element.clone());
		if alias.target_address() == &address {
			return Err(RegistryError::IllegalArgument(format!("alias {address} targets itself")));
		}
		let registration = self.attach_terminal(element, Terminal::Alias(alias))?;
		tracing::debug!(address = %registration.address(), caller = self.caller.name(), "registered alias");
		Ok(registration)
	}

	pub fn unregister_alias(&self, element: &PathElement) -> Result<(), RegistryError> {
		self.require(Permission::Access)?;
		self.detach_terminal(element, Registered::Alias, |state| state.alias().is_some())
	}

	fn attach_terminal(&self, element: PathElement, terminal: Terminal) -> Result<ResourceRegistration, RegistryError> {
		check_depth(&self.config, self.address().len() + 1)?;
		loop {
			let state = self.node.load();
			check_not_terminal(&self.node, &state)?;

			if let Some(existing) = state.child(&element).cloned() {
				let outcome = existing.update(|child| {
					if let Some(reason) = terminal_conflict(child) {
						return Err(RegistryError::illegal_state(existing.address(), reason));
					}
					child.terminal = Some(terminal.clone());
					Ok(())
				});
				match outcome {
					Ok(()) => return Ok(self.with_node(existing)),
					// detached concurrently, look again
					Err(RegistryError::Removed { .. }) => continue,
					Err(err) => return Err(err),
				}
			}

			let mut initial = NodeState::new("", forbids_persisted_children(&self.node));
			initial.terminal = Some(terminal.clone());
			initial.terminal_only = true;
			let child = Node::child_of(&self.node, element.clone(), initial);
			match attach(&self.node, child.clone()) {
				Ok(()) => return Ok(self.with_node(child)),
				Err(RegistryError::DuplicateRegistration { .. }) => continue,
				Err(err) => return Err(err),
			}
		}
	}

	/// Drops the terminal at `element`. A node created for the terminal goes with
	/// it; a registration the terminal was laid over stays, minus the terminal.
	fn detach_terminal(
		&self,
		element: &PathElement,
		what: Registered,
		holds: fn(&NodeState) -> bool,
	) -> Result<(), RegistryError> {
		loop {
			let Some(child) = self.node.load().child(element).cloned() else {
				return Err(RegistryError::absent(self.address(), what, element));
			};
			let child_state = child.load();
			if !holds(&child_state) {
				return Err(RegistryError::absent(self.address(), what, element));
			}

			if !child_state.terminal_only {
				let cleared = child.update(|state| {
					if !holds(state) {
						return Err(RegistryError::absent(self.address(), what, element));
					}
					state.terminal = None;
					Ok(())
				});
				match cleared {
					Ok(()) => {
						tracing::debug!(address = %child.address(), %what, "cleared terminal from registration");
						return Ok(());
					}
					// detached concurrently, look again
					Err(RegistryError::Removed { .. }) => continue,
					Err(err) => return Err(err),
				}
			}

			let removed = self.node.update(|state| {
				let current = state.child(element).is_some_and(|current| Arc::ptr_eq(current, &child));
				Ok(if current { state.remove_child(element) } else { None })
			})?;
			if let Some(node) = removed {
				node.seal();
				tracing::debug!(address = %node.address(), %what, "unregistered terminal registration");
				return Ok(());
			}
		}
	}

	/// Finds the registration governing `address` relative to this one.
	///
	/// Each element prefers an exact child, then the wildcard child's override model
	/// for that value, then the wildcard child itself. Returns `None` when nothing
	/// matches or the walk runs into an alias or proxy registration.
	pub fn sub_model(&self, address: &PathAddress) -> Result<Option<ResourceRegistration>, RegistryError> {
		self.require(Permission::Read)?;
		let mut node = self.node.clone();
		for element in address {
			let state = node.load();
			if state.removed || state.terminal.is_some() {
				return Ok(None);
			}
			match governing_child(&node, &state, element) {
				Some(next) => node = next,
				None => return Ok(None),
			}
		}
		if node.is_removed() {
			return Ok(None);
		}
		Ok(Some(self.with_node(node)))
	}

	/// Own state first, then the wildcard state an override refines.
	fn layers(&self) -> Vec<Arc<NodeState>> {
		layers(&self.node)
	}

	pub fn description(&self) -> String {
		self.node.load().description.to_string()
	}

	pub fn attribute_names(&self) -> Vec<String> {
		let mut names: Vec<String> = Vec::new();
		for layer in self.layers() {
			for name in layer.attributes.keys() {
				if !names.iter().any(|seen| seen.as_str() == &**name) {
					names.push(name.to_string());
				}
			}
		}
		names
	}

	/// Attribute registered here. Attributes are never inherited from ancestors.
	pub fn attribute_access(&self, name: &str) -> Option<Arc<AttributeAccess>> {
		self.layers().iter().find_map(|layer| layer.attributes.get(name).cloned())
	}

	/// Operations registered directly here, without inherited ones.
	pub fn operation_names(&self) -> Vec<String> {
		let mut names: Vec<String> = Vec::new();
		for layer in self.layers() {
			for name in layer.operations.keys() {
				if !names.iter().any(|seen| seen.as_str() == &**name) {
					names.push(name.to_string());
				}
			}
		}
		names
	}

	/// Operation registered here, or the nearest inherited one on an ancestor.
	pub fn operation_entry(&self, name: &str) -> Option<Arc<OperationEntry>> {
		if let Some(entry) = self.layers().iter().find_map(|layer| layer.operations.get(name).cloned()) {
			return Some(entry);
		}
		let mut current = self.node.parent();
		while let Some(ancestor) = current {
			let inherited = layers(&ancestor)
				.iter()
				.find_map(|layer| layer.operations.get(name).filter(|entry| entry.is_inherited()).cloned());
			if inherited.is_some() {
				return inherited;
			}
			current = ancestor.parent();
		}
		None
	}

	pub fn child_types(&self) -> Vec<String> {
		let mut keys = BTreeSet::new();
		for layer in self.layers() {
			keys.extend(layer.child_types.iter().map(|key| key.to_string()));
		}
		keys.into_iter().collect()
	}

	/// Addresses of the registered children, wildcard children included.
	pub fn child_addresses(&self) -> Vec<PathAddress> {
		let mut addresses: Vec<PathAddress> = self
			.layers()
			.iter()
			.flat_map(|layer| layer.all_children().map(|child| child.address().clone()).collect::<Vec<_>>())
			.collect();
		addresses.sort_by_cached_key(|address| address.to_string());
		addresses.dedup();
		addresses
	}

	pub fn override_names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.node.load().overrides.keys().map(|name| name.to_string()).collect();
		names.sort();
		names
	}

	/// Name of the override model this handle refers to, if it is one.
	pub fn override_name(&self) -> Option<&str> {
		match self.node.kind() {
			NodeKind::Override => self.node.element().map(PathElement::value),
			NodeKind::Root | NodeKind::Concrete => None,
		}
	}

	/// True if this registration or any ancestor is runtime-only.
	pub fn is_runtime_only(&self) -> bool {
		inherits_runtime_only(&self.node)
	}

	/// True if this registration hands off to a proxy controller.
	pub fn is_remote(&self) -> bool {
		self.node.load().proxy().is_some()
	}

	pub fn is_alias(&self) -> bool {
		self.node.load().alias().is_some()
	}

	pub fn alias_entry(&self) -> Option<AliasEntry> {
		self.node.load().alias().cloned()
	}

	pub fn proxy_controller(&self) -> Option<SharedProxy> {
		self.node.load().proxy().cloned()
	}

	pub fn is_removed(&self) -> bool {
		self.node.is_removed()
	}
}

impl fmt::Debug for ResourceRegistration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceRegistration")
			.field("address", self.address())
			.field("caller", &self.caller.name())
			.finish_non_exhaustive()
	}
}

fn layers(node: &Node) -> Vec<Arc<NodeState>> {
	let mut layers = vec![node.load()];
	if let Some(base) = node.base() {
		layers.push(base.load());
	}
	layers
}

/// Registration governing `element` beneath `node`, whose current state is `state`.
pub(crate) fn governing_child(node: &Node, state: &NodeState, element: &PathElement) -> Option<Arc<Node>> {
	let base = node.base().map(|base| base.load());
	let exact = state.child(element).or_else(|| base.as_deref().and_then(|base| base.child(element)));
	if let Some(exact) = exact {
		return Some(exact.clone());
	}
	let wildcard = state
		.wildcard_child(element.key())
		.or_else(|| base.as_deref().and_then(|base| base.wildcard_child(element.key())))?;
	let over = wildcard.load().overrides.get(element.value()).cloned();
	Some(over.unwrap_or_else(|| wildcard.clone()))
}

/// Whether `flag` holds for `node`, an ancestor, or the wildcard either of them refines.
fn along_ancestry(node: &Node, flag: impl Fn(&NodeState) -> bool) -> bool {
	let holds = |node: &Node| flag(&node.load()) || node.base().is_some_and(|base| flag(&base.load()));
	if holds(node) {
		return true;
	}
	let mut current = node.parent();
	while let Some(ancestor) = current {
		if holds(&ancestor) {
			return true;
		}
		current = ancestor.parent();
	}
	false
}

fn inherits_runtime_only(node: &Node) -> bool {
	along_ancestry(node, |state| state.runtime_only)
}

/// True beneath a registration whose definition declared it runtime-only.
pub(crate) fn forbids_persisted_children(node: &Node) -> bool {
	along_ancestry(node, |state| state.declared_runtime_only)
}

pub(crate) fn check_depth(config: &RegistryConfig, depth: usize) -> Result<(), RegistryError> {
	if depth > config.max_address_depth {
		return Err(RegistryError::IllegalArgument(format!(
			"address depth {depth} exceeds the configured maximum of {}",
			config.max_address_depth
		)));
	}
	Ok(())
}

fn check_not_terminal(node: &Node, state: &NodeState) -> Result<(), RegistryError> {
	if state.removed {
		return Err(RegistryError::Removed {
			address: node.address().clone(),
		});
	}
	match state.terminal {
		Some(Terminal::Alias(_)) => Err(RegistryError::illegal_state(node.address(), IllegalStateReason::BeneathAlias)),
		Some(Terminal::Proxy(_)) => Err(RegistryError::illegal_state(node.address(), IllegalStateReason::BeneathProxy)),
		None => Ok(()),
	}
}

pub(crate) fn check_accepts_child(node: &Node, state: &NodeState, element: &PathElement) -> Result<(), RegistryError> {
	check_not_terminal(node, state)?;
	if state.child(element).is_some() {
		return Err(RegistryError::duplicate(
			&node.address().append(element.clone()),
			Registered::Resource,
			element.to_string(),
		));
	}
	Ok(())
}

fn check_overridable(node: &Arc<Node>, state: &NodeState) -> Result<(), RegistryError> {
	let reason = match node.kind() {
		NodeKind::Root => Some(IllegalStateReason::OverrideOnRoot),
		NodeKind::Override => Some(IllegalStateReason::OverrideOnOverride),
		NodeKind::Concrete if !node.element().is_some_and(PathElement::is_wildcard) => {
			Some(IllegalStateReason::OverrideOnNonWildcard)
		}
		NodeKind::Concrete => match state.terminal {
			Some(Terminal::Proxy(_)) => Some(IllegalStateReason::OverrideOnRemote),
			Some(Terminal::Alias(_)) => Some(IllegalStateReason::OverrideOnAlias),
			None if state.runtime_only || node.parent().is_some_and(|parent| inherits_runtime_only(&parent)) => {
				Some(IllegalStateReason::OverrideOnRuntimeOnly)
			}
			None => None,
		},
	};
	match reason {
		Some(reason) => Err(RegistryError::illegal_state(node.address(), reason)),
		None if state.removed => Err(RegistryError::Removed {
			address: node.address().clone(),
		}),
		None => Ok(()),
	}
}

fn terminal_conflict(state: &NodeState) -> Option<IllegalStateReason> {
	if state.has_children() {
		return Some(IllegalStateReason::HasChildren);
	}
	match state.terminal {
		Some(Terminal::Proxy(_)) => Some(IllegalStateReason::AlreadyProxy),
		Some(Terminal::Alias(_)) => Some(IllegalStateReason::AlreadyAlias),
		None => None,
	}
}

/// Publishes the off-tree node `child` under `parent` with a single swap.
pub(crate) fn attach(parent: &Node, child: Arc<Node>) -> Result<(), RegistryError> {
	publish(parent, child, false)
}

/// Like [`attach`] for a bare intermediate node, which must not hide a
/// registration (wildcard or override model) already governing its element.
/// Fails with the governing registration's address as a duplicate.
pub(crate) fn attach_intermediate(parent: &Node, child: Arc<Node>) -> Result<(), RegistryError> {
	publish(parent, child, true)
}

fn publish(parent: &Node, child: Arc<Node>, intermediate: bool) -> Result<(), RegistryError> {
	let Some(element) = child.element().cloned() else {
		return Err(RegistryError::IllegalArgument("the root cannot be attached as a child".to_string()));
	};
	let persisted = !child.load().declared_runtime_only;
	parent.update(|state| {
		check_accepts_child(parent, state, &element)?;
		if intermediate && let Some(governing) = governing_child(parent, state, &element) {
			return Err(RegistryError::duplicate(
				governing.address(),
				Registered::Resource,
				element.to_string(),
			));
		}
		if persisted && (state.declared_runtime_only || forbids_persisted_children(parent)) {
			return Err(RegistryError::illegal_state(
				parent.address(),
				IllegalStateReason::PersistedBeneathRuntimeOnly,
			));
		}
		state.insert_child(child.clone());
		Ok(())
	})
}
