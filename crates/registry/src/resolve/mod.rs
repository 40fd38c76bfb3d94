//! Address resolution.
//!
//! Walks the tree one element at a time. At each step an exact child wins over the
//! wildcard child; a concrete value reached through a wildcard child picks up that
//! child's override model for the value, if one is registered. Entering a proxy
//! registration ends the walk with a [`ProxyHandoff`]; entering an alias restarts
//! the walk from the root at the alias target, at most
//! [`RegistryConfig::max_alias_hops`] times. Addresses (and alias targets) deeper
//! than [`RegistryConfig::max_address_depth`] resolve to nothing.

mod resolved;

use std::sync::Arc;

use keel_address::{PathAddress, PathElement};
pub use resolved::ResolvedRegistration;
pub(crate) use resolved::{AppliedOverride, PinnedNode};

use crate::config::RegistryConfig;
use crate::proxy::ProxyHandoff;
use crate::tree::{Node, NodeState};

/// Outcome of resolving an address.
#[derive(Debug, Clone)]
pub enum Resolution {
	/// A local registration governs the address.
	Registration(ResolvedRegistration),
	/// A proxy controller owns the address.
	Proxy(ProxyHandoff),
	NotFound,
}

impl Resolution {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound)
	}

	pub fn registration(&self) -> Option<&ResolvedRegistration> {
		match self {
			Self::Registration(resolved) => Some(resolved),
			_ => None,
		}
	}

	pub fn into_registration(self) -> Option<ResolvedRegistration> {
		match self {
			Self::Registration(resolved) => Some(resolved),
			_ => None,
		}
	}

	pub fn proxy(&self) -> Option<&ProxyHandoff> {
		match self {
			Self::Proxy(handoff) => Some(handoff),
			_ => None,
		}
	}
}

enum Step {
	Found(PinnedNode),
	Handoff(ProxyHandoff),
	Redirect(PathAddress),
	Missing,
}

enum Walk {
	Done(Resolution),
	Redirect(PathAddress),
}

pub(crate) fn resolve(root: &Arc<Node>, config: &RegistryConfig, address: &PathAddress) -> Resolution {
	let mut target = address.clone();
	let mut hops = 0usize;
	loop {
		if target.len() > config.max_address_depth {
			tracing::debug!(%address, %target, max = config.max_address_depth, "address exceeds the maximum depth");
			return Resolution::NotFound;
		}
		let redirected = match walk(root, address, &target) {
			Walk::Done(resolution) => return resolution,
			Walk::Redirect(redirected) => redirected,
		};
		hops += 1;
		if hops > config.max_alias_hops {
			tracing::warn!(%address, hops, "alias redirection limit exceeded");
			return Resolution::NotFound;
		}
		tracing::trace!(%address, from = %target, to = %redirected, "following alias");
		target = redirected;
	}
}

/// One pass from the root along `target`.
fn walk(root: &Arc<Node>, requested: &PathAddress, target: &PathAddress) -> Walk {
	let mut current = PinnedNode::new(root.clone(), root.load(), None);
	let mut ancestors = Vec::with_capacity(target.len());
	for (depth, element) in target.iter().enumerate() {
		match step(&current, target, depth, element) {
			Step::Found(next) => {
				ancestors.push(current);
				current = next;
			}
			Step::Handoff(handoff) => {
				tracing::trace!(address = %requested, proxy = %handoff.proxy_address(), "resolved to proxy");
				return Walk::Done(Resolution::Proxy(handoff));
			}
			Step::Redirect(redirected) => return Walk::Redirect(redirected),
			Step::Missing => {
				tracing::trace!(address = %requested, depth, "no registration");
				return Walk::Done(Resolution::NotFound);
			}
		}
	}
	Walk::Done(Resolution::Registration(ResolvedRegistration::new(
		requested.clone(),
		ancestors,
		current,
	)))
}

fn step(current: &PinnedNode, target: &PathAddress, depth: usize, element: &PathElement) -> Step {
	let exact = current.layers().find_map(|state| state.child(element));
	let (child, via_wildcard) = match exact {
		Some(child) => (child, false),
		None => match current.layers().find_map(|state| state.wildcard_child(element.key())) {
			Some(child) => (child, true),
			None => return Step::Missing,
		},
	};

	let state = child.load();
	if state.removed {
		return Step::Missing;
	}
	if let Some(controller) = state.proxy() {
		return Step::Handoff(ProxyHandoff::new(
			controller.clone(),
			target.prefix(depth + 1),
			target.suffix(depth + 1),
		));
	}
	if let Some(alias) = state.alias() {
		return Step::Redirect(alias.convert_to_target_address(target, depth + 1));
	}

	let applied = if via_wildcard && !element.is_wildcard() {
		applied_override(&state, element)
	} else {
		None
	};
	Step::Found(PinnedNode::new(child.clone(), state, applied))
}

fn applied_override(state: &NodeState, element: &PathElement) -> Option<AppliedOverride> {
	let (name, node) = state.overrides.get_key_value(element.value())?;
	let over = node.load();
	if over.removed {
		return None;
	}
	Some(AppliedOverride::new(name.clone(), node.clone(), over))
}

#[cfg(test)]
mod tests;
