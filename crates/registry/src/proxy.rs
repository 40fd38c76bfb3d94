use std::fmt;
use std::sync::Arc;

use keel_address::PathAddress;
use serde_json::Value;

use crate::descriptor::HandlerError;

/// A request forwarded across a proxy boundary.
#[derive(Debug, Clone, Copy)]
pub struct ProxyRequest<'a> {
	/// Address of the proxy registration in the local tree.
	pub proxy_address: &'a PathAddress,
	/// Part of the requested address beneath the proxy registration.
	pub remaining: &'a PathAddress,
	pub operation: &'a str,
	pub params: &'a Value,
}

/// Remote controller owning everything beneath a proxy registration.
pub trait ProxyController: Send + Sync {
	fn execute(&self, request: &ProxyRequest<'_>) -> Result<Value, HandlerError>;
}

pub type SharedProxy = Arc<dyn ProxyController>;

/// Result of resolving an address at or beneath a proxy registration.
#[derive(Clone)]
pub struct ProxyHandoff {
	controller: SharedProxy,
	proxy_address: PathAddress,
	remaining: PathAddress,
}

impl ProxyHandoff {
	pub(crate) fn new(controller: SharedProxy, proxy_address: PathAddress, remaining: PathAddress) -> Self {
		Self {
			controller,
			proxy_address,
			remaining,
		}
	}

	pub fn controller(&self) -> &SharedProxy {
		&self.controller
	}

	pub fn proxy_address(&self) -> &PathAddress {
		&self.proxy_address
	}

	/// Unconsumed part of the requested address.
	pub fn remaining(&self) -> &PathAddress {
		&self.remaining
	}

	/// Forwards an operation to the controller.
	pub fn execute(&self, operation: &str, params: &Value) -> Result<Value, HandlerError> {
		self.controller.execute(&ProxyRequest {
			proxy_address: &self.proxy_address,
			remaining: &self.remaining,
			operation,
			params,
		})
	}
}

impl fmt::Debug for ProxyHandoff {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProxyHandoff")
			.field("proxy_address", &self.proxy_address)
			.field("remaining", &self.remaining)
			.finish_non_exhaustive()
	}
}
