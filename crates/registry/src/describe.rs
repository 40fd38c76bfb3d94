//! Serializable descriptions of registrations.

use std::collections::BTreeMap;

use keel_address::PathAddress;
use serde::Serialize;

use crate::descriptor::{AccessType, AttributeAccess, EntryType, OperationEntry, Storage};
use crate::resolve::ResolvedRegistration;
use crate::tree::{Node, NodeState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescription {
	pub name: String,
	pub access: AccessType,
	pub storage: Storage,
	pub flags: Vec<String>,
}

impl From<&AttributeAccess> for AttributeDescription {
	fn from(attribute: &AttributeAccess) -> Self {
		Self {
			name: attribute.name().to_string(),
			access: attribute.access_type(),
			storage: attribute.storage(),
			flags: attribute.flags().iter_names().map(|(name, _)| name.to_string()).collect(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescription {
	pub name: String,
	pub entry_type: EntryType,
	pub inherited: bool,
	pub flags: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl From<&OperationEntry> for OperationDescription {
	fn from(entry: &OperationEntry) -> Self {
		Self {
			name: entry.name().to_string(),
			entry_type: entry.entry_type(),
			inherited: entry.is_inherited(),
			flags: entry.flags().iter_names().map(|(name, _)| name.to_string()).collect(),
			description: entry.description().map(str::to_string),
		}
	}
}

/// Snapshot description of one registration and, for recursive descriptions, of
/// everything registered beneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceDescription {
	pub address: PathAddress,
	pub description: String,
	pub runtime_only: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub override_name: Option<String>,
	pub attributes: Vec<AttributeDescription>,
	pub operations: Vec<OperationDescription>,
	pub child_types: Vec<String>,
	pub override_names: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub alias_target: Option<PathAddress>,
	pub proxy: bool,
	/// Keyed by the child's path element, `key=value`.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub children: BTreeMap<String, ResourceDescription>,
}

impl ResourceDescription {
	/// Describes what a resolution observed, inherited operations included.
	pub(crate) fn of_resolved(resolved: &ResolvedRegistration) -> Self {
		let leaf = resolved.leaf().state();
		Self {
			address: resolved.address().clone(),
			description: resolved.description().to_string(),
			runtime_only: resolved.is_runtime_only(),
			override_name: resolved.override_name().map(str::to_string),
			attributes: resolved
				.attribute_names()
				.into_iter()
				.filter_map(|name| resolved.attribute(name))
				.map(AttributeDescription::from)
				.collect(),
			operations: resolved
				.operation_names(true)
				.into_iter()
				.filter_map(|name| resolved.operation(name))
				.map(OperationDescription::from)
				.collect(),
			child_types: resolved.child_types().into_iter().map(str::to_string).collect(),
			override_names: override_names(leaf),
			..Self::default()
		}
	}

	/// Describes a node from its own snapshot, without inherited operations.
	pub(crate) fn of_node(node: &Node, state: &NodeState, runtime_only: bool) -> Self {
		Self {
			address: node.address().clone(),
			description: state.description.to_string(),
			runtime_only: runtime_only || state.runtime_only,
			override_name: node.base().and(node.element()).map(|element| element.value().to_string()),
			attributes: state.attributes.values().map(|a| AttributeDescription::from(&**a)).collect(),
			operations: state.operations.values().map(|e| OperationDescription::from(&**e)).collect(),
			child_types: state.child_types.iter().map(|key| key.to_string()).collect(),
			override_names: override_names(state),
			alias_target: state.alias().map(|alias| alias.target_address().clone()),
			proxy: state.proxy().is_some(),
			..Self::default()
		}
	}

	/// Fills in `children` from `state`, descending through every live child.
	/// Override models of a wildcard child are listed next to it under their own
	/// element, `key=name`, unless an exact child holds that element. Children
	/// already present are kept.
	pub(crate) fn with_children(mut self, state: &NodeState, runtime_only: bool) -> Self {
		let live: Vec<_> = state
			.all_children()
			.map(|child| (child, child.load()))
			.filter(|(_, child_state)| !child_state.removed)
			.collect();
		for (child, child_state) in &live {
			self = self.with_child(child, child_state, runtime_only);
		}
		for (_, child_state) in &live {
			let inherited = runtime_only || child_state.runtime_only;
			for over in child_state.overrides.values() {
				let over_state = over.load();
				if !over_state.removed {
					self = self.with_child(over, &over_state, inherited);
				}
			}
		}
		self
	}

	fn with_child(mut self, child: &Node, child_state: &NodeState, runtime_only: bool) -> Self {
		let Some(element) = child.element() else {
			return self;
		};
		let inherited = runtime_only || child_state.runtime_only;
		let description = Self::of_node(child, child_state, inherited).with_children(child_state, inherited);
		self.children.entry(element.to_string()).or_insert(description);
		self
	}
}

fn override_names(state: &NodeState) -> Vec<String> {
	let mut names: Vec<String> = state.overrides.keys().map(|name| name.to_string()).collect();
	names.sort();
	names
}
