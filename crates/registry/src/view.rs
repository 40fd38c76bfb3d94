use std::sync::Arc;

use keel_address::PathAddress;

use crate::access::{self, Caller, Permission};
use crate::config::RegistryConfig;
use crate::describe::ResourceDescription;
use crate::error::RegistryError;
use crate::proxy::ProxyHandoff;
use crate::resolve::{self, Resolution};
use crate::tree::{Node, NodeState};

/// Read capability over a [`crate::ManagementRegistry`].
///
/// Every entry point checks [`Permission::Read`] for the caller the view was
/// obtained for.
#[derive(Clone)]
pub struct ReadView {
	root: Arc<Node>,
	config: Arc<RegistryConfig>,
	caller: Caller,
}

impl ReadView {
	pub(crate) fn new(root: Arc<Node>, config: Arc<RegistryConfig>, caller: Caller) -> Self {
		Self { root, config, caller }
	}

	pub fn caller(&self) -> &Caller {
		&self.caller
	}

	pub fn resolve(&self, address: &PathAddress) -> Result<Resolution, RegistryError> {
		access::require(&self.config, &self.caller, Permission::Read)?;
		Ok(resolve::resolve(&self.root, &self.config, address))
	}

	/// Describes the registration governing `address`, inherited operations included.
	///
	/// `None` when nothing local governs the address, either because nothing is
	/// registered or because a proxy controller owns it.
	pub fn describe(&self, address: &PathAddress) -> Result<Option<ResourceDescription>, RegistryError> {
		Ok(self
			.resolve(address)?
			.registration()
			.map(ResourceDescription::of_resolved))
	}

	/// Like [`Self::describe`], adding descriptions of every registration beneath.
	pub fn describe_recursive(&self, address: &PathAddress) -> Result<Option<ResourceDescription>, RegistryError> {
		let Some(resolved) = self.resolve(address)?.into_registration() else {
			return Ok(None);
		};
		let runtime_only = resolved.is_runtime_only();
		let mut description = ResourceDescription::of_resolved(&resolved);
		for state in resolved.leaf().layers() {
			description = description.with_children(state, runtime_only);
		}
		Ok(Some(description))
	}

	/// Every proxy controller at or beneath `address`.
	///
	/// An address owned by a proxy yields that proxy alone. Otherwise the subtree of
	/// the governing registration (override models included) is searched; the
	/// handoffs returned carry an empty remaining address. Sorted by proxy address.
	pub fn proxy_controllers(&self, address: &PathAddress) -> Result<Vec<ProxyHandoff>, RegistryError> {
		let resolved = match self.resolve(address)? {
			Resolution::Proxy(handoff) => return Ok(vec![handoff]),
			Resolution::NotFound => return Ok(Vec::new()),
			Resolution::Registration(resolved) => resolved,
		};
		let mut found = Vec::new();
		for state in resolved.leaf().layers() {
			collect_proxies(state, &mut found);
		}
		found.sort_by_cached_key(|handoff| handoff.proxy_address().to_string());
		found.dedup_by(|a, b| a.proxy_address() == b.proxy_address());
		Ok(found)
	}
}

fn collect_proxies(state: &NodeState, found: &mut Vec<ProxyHandoff>) {
	let beneath = state.all_children().chain(state.overrides.values());
	for node in beneath {
		let child = node.load();
		if child.removed {
			continue;
		}
		match child.proxy() {
			Some(controller) => found.push(ProxyHandoff::new(
				controller.clone(),
				node.address().clone(),
				PathAddress::root(),
			)),
			None => collect_proxies(&child, found),
		}
	}
}
