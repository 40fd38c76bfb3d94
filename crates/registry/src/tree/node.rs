//! Registration nodes and their published state.
//!
//! # Role
//!
//! A [`Node`] is a position in the registration tree. Everything mutable about it
//! lives in an immutable [`NodeState`] published through an `ArcSwap`; writers build
//! a replacement state and install it with compare-and-swap.
//!
//! # Invariants
//!
//! - A published `NodeState` is never mutated in place.
//! - Once a state with `removed == true` is published, no further state is ever
//!   published for that node (see [`Node::update`]).
//! - A node is sealed only after it has been detached from its parent, and sealing
//!   walks the sealed (final) state, so children attached by a racing writer before
//!   the seal are sealed too.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use keel_address::{PathAddress, PathElement};
use rustc_hash::FxHashMap;

use crate::alias::AliasEntry;
use crate::descriptor::{AttributeAccess, OperationEntry};
use crate::error::RegistryError;
use crate::proxy::SharedProxy;

/// Children of one key, by value. The wildcard registration sits under `*`.
pub(crate) type ChildBucket = FxHashMap<Arc<str>, Arc<Node>>;

/// What sits at the end of a terminal registration.
#[derive(Clone)]
pub(crate) enum Terminal {
	Alias(AliasEntry),
	Proxy(SharedProxy),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
	Root,
	Concrete,
	/// A named refinement layered on the wildcard registration `base`.
	Override,
}

/// Snapshot of a node's mutable content.
#[derive(Clone, Default)]
pub(crate) struct NodeState {
	pub description: Arc<str>,
	pub attributes: Arc<IndexMap<Arc<str>, Arc<AttributeAccess>>>,
	pub operations: Arc<IndexMap<Arc<str>, Arc<OperationEntry>>>,
	/// Declared child keys, including ones with no registered child yet.
	pub child_types: Arc<BTreeSet<Arc<str>>>,
	pub children: Arc<FxHashMap<Arc<str>, ChildBucket>>,
	pub overrides: Arc<FxHashMap<Arc<str>, Arc<Node>>>,
	pub terminal: Option<Terminal>,
	/// The node exists only to carry `terminal` and goes away with it.
	pub terminal_only: bool,
	/// Reported runtime-only flag; [`crate::ResourceRegistration::set_runtime_only`] changes it.
	pub runtime_only: bool,
	/// Runtime-only as declared when the node was created. Never changes, and only
	/// this flag keeps persisted registrations out of the subtree.
	pub declared_runtime_only: bool,
	pub removed: bool,
}

impl NodeState {
	pub(crate) fn new(description: &str, runtime_only: bool) -> Self {
		Self {
			description: Arc::from(description),
			runtime_only,
			declared_runtime_only: runtime_only,
			..Self::default()
		}
	}

	pub(crate) fn child(&self, element: &PathElement) -> Option<&Arc<Node>> {
		self.children.get(element.key())?.get(element.value())
	}

	pub(crate) fn wildcard_child(&self, key: &str) -> Option<&Arc<Node>> {
		self.children.get(key)?.get(PathElement::WILDCARD_VALUE)
	}

	pub(crate) fn has_children(&self) -> bool {
		self.children.values().any(|bucket| !bucket.is_empty())
	}

	pub(crate) fn all_children(&self) -> impl Iterator<Item = &Arc<Node>> {
		self.children.values().flat_map(|bucket| bucket.values())
	}

	pub(crate) fn insert_child(&mut self, node: Arc<Node>) {
		let Some(element) = node.element() else {
			return;
		};
		let key: Arc<str> = Arc::from(element.key());
		let value: Arc<str> = Arc::from(element.value());
		Arc::make_mut(&mut self.child_types).insert(key.clone());
		Arc::make_mut(&mut self.children).entry(key).or_default().insert(value, node);
	}

	pub(crate) fn remove_child(&mut self, element: &PathElement) -> Option<Arc<Node>> {
		let children = Arc::make_mut(&mut self.children);
		let bucket = children.get_mut(element.key())?;
		let removed = bucket.remove(element.value())?;
		if bucket.is_empty() {
			children.remove(element.key());
		}
		Some(removed)
	}

	pub(crate) fn alias(&self) -> Option<&AliasEntry> {
		match &self.terminal {
			Some(Terminal::Alias(entry)) => Some(entry),
			_ => None,
		}
	}

	pub(crate) fn proxy(&self) -> Option<&SharedProxy> {
		match &self.terminal {
			Some(Terminal::Proxy(controller)) => Some(controller),
			_ => None,
		}
	}
}

/// A position in the registration tree.
pub(crate) struct Node {
	kind: NodeKind,
	element: Option<PathElement>,
	address: PathAddress,
	/// Tree parent. For override nodes this is the wildcard node's parent.
	parent: Weak<Node>,
	/// Wildcard registration an override refines.
	base: Weak<Node>,
	state: ArcSwap<NodeState>,
}

impl Node {
	pub(crate) fn root(state: NodeState) -> Arc<Self> {
		Arc::new(Self {
			kind: NodeKind::Root,
			element: None,
			address: PathAddress::root(),
			parent: Weak::new(),
			base: Weak::new(),
			state: ArcSwap::from_pointee(state),
		})
	}

	pub(crate) fn child_of(parent: &Arc<Node>, element: PathElement, state: NodeState) -> Arc<Self> {
		Arc::new(Self {
			kind: NodeKind::Concrete,
			address: parent.address.append(element.clone()),
			element: Some(element),
			parent: Arc::downgrade(parent),
			base: Weak::new(),
			state: ArcSwap::from_pointee(state),
		})
	}

	/// Builds an override of the wildcard node `base` for the specific `element`.
	pub(crate) fn override_of(base: &Arc<Node>, element: PathElement, state: NodeState) -> Arc<Self> {
		Arc::new(Self {
			kind: NodeKind::Override,
			address: base.address.parent().append(element.clone()),
			element: Some(element),
			parent: base.parent.clone(),
			base: Arc::downgrade(base),
			state: ArcSwap::from_pointee(state),
		})
	}

	pub(crate) fn kind(&self) -> NodeKind {
		self.kind
	}

	pub(crate) fn element(&self) -> Option<&PathElement> {
		self.element.as_ref()
	}

	pub(crate) fn address(&self) -> &PathAddress {
		&self.address
	}

	pub(crate) fn parent(&self) -> Option<Arc<Node>> {
		self.parent.upgrade()
	}

	pub(crate) fn base(&self) -> Option<Arc<Node>> {
		self.base.upgrade()
	}

	/// Current published state; wait-free.
	pub(crate) fn load(&self) -> Arc<NodeState> {
		self.state.load_full()
	}

	/// Applies `edit` to a copy of the current state and publishes it.
	///
	/// `edit` may run several times under contention and must therefore be free of
	/// side effects outside the state it is given. Fails with
	/// [`RegistryError::Removed`] once the node is sealed, and publishes nothing
	/// when `edit` fails.
	pub(crate) fn update<R>(&self, mut edit: impl FnMut(&mut NodeState) -> Result<R, RegistryError>) -> Result<R, RegistryError> {
		loop {
			let old = self.state.load_full();
			if old.removed {
				return Err(RegistryError::Removed {
					address: self.address.clone(),
				});
			}
			let mut next = NodeState::clone(&old);
			let out = edit(&mut next)?;
			let prev = self.state.compare_and_swap(&old, Arc::new(next));
			if Arc::ptr_eq(&prev, &old) {
				return Ok(out);
			}
			// CAS lost, retry against the newer state
		}
	}

	/// Marks this node and everything reachable from it as removed.
	pub(crate) fn seal(&self) {
		let sealed = loop {
			let old = self.state.load_full();
			if old.removed {
				return;
			}
			let mut next = NodeState::clone(&old);
			next.removed = true;
			let next = Arc::new(next);
			let prev = self.state.compare_and_swap(&old, next.clone());
			if Arc::ptr_eq(&prev, &old) {
				break next;
			}
		};
		for child in sealed.all_children() {
			child.seal();
		}
		for over in sealed.overrides.values() {
			over.seal();
		}
	}

	pub(crate) fn is_removed(&self) -> bool {
		self.state.load().removed
	}
}
