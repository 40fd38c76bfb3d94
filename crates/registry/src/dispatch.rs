//! Routes operation requests to the handlers the registry resolves for them.

use keel_address::PathAddress;
use serde_json::Value;

use crate::descriptor::{EntryType, HandlerError, OperationContext};
use crate::error::RegistryError;
use crate::resolve::{Resolution, ResolvedRegistration};
use crate::view::ReadView;

/// Global operation reading an attribute through its read (or metric) handler.
pub const READ_ATTRIBUTE: &str = "read-attribute";
/// Global operation writing an attribute through its write handler.
pub const WRITE_ATTRIBUTE: &str = "write-attribute";

/// Who is asking. Private operations are only reachable internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchOrigin {
	#[default]
	External,
	Internal,
}

#[derive(Debug, Clone)]
pub struct OperationRequest {
	pub address: PathAddress,
	pub operation: String,
	pub params: Value,
	pub origin: DispatchOrigin,
}

impl OperationRequest {
	pub fn new(address: PathAddress, operation: impl Into<String>) -> Self {
		Self {
			address,
			operation: operation.into(),
			params: Value::Null,
			origin: DispatchOrigin::External,
		}
	}

	pub fn with_params(mut self, params: Value) -> Self {
		self.params = params;
		self
	}

	pub fn internal(mut self) -> Self {
		self.origin = DispatchOrigin::Internal;
		self
	}

	fn param(&self, name: &'static str) -> Option<&Value> {
		self.params.get(name)
	}
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error("no resource is registered at {address}")]
	ResourceNotFound { address: PathAddress },

	#[error("operation '{operation}' is not available at {address}")]
	OperationNotFound { address: PathAddress, operation: String },

	#[error("attribute '{name}' is not registered at {address}")]
	AttributeNotFound { address: PathAddress, name: String },

	#[error("attribute '{name}' at {address} is not writable")]
	NotWritable { address: PathAddress, name: String },

	#[error("attribute '{name}' at {address} has no read handler")]
	NoReadHandler { address: PathAddress, name: String },

	#[error("operation '{operation}' requires parameter '{name}'")]
	MissingParameter { operation: String, name: &'static str },

	#[error(transparent)]
	Handler(#[from] HandlerError),
}

/// Executes [`OperationRequest`]s against a registry.
#[derive(Clone)]
pub struct Dispatcher {
	view: ReadView,
}

impl Dispatcher {
	pub fn new(view: ReadView) -> Self {
		Self { view }
	}

	pub fn dispatch(&self, request: &OperationRequest) -> Result<Value, DispatchError> {
		let resolved = match self.view.resolve(&request.address)? {
			Resolution::Registration(resolved) => resolved,
			Resolution::Proxy(handoff) => {
				tracing::debug!(
					address = %request.address,
					proxy = %handoff.proxy_address(),
					operation = %request.operation,
					"forwarding to proxy controller"
				);
				return Ok(handoff.execute(&request.operation, &request.params)?);
			}
			Resolution::NotFound => {
				return Err(DispatchError::ResourceNotFound {
					address: request.address.clone(),
				});
			}
		};

		match request.operation.as_str() {
			READ_ATTRIBUTE => read_attribute(&resolved, request),
			WRITE_ATTRIBUTE => write_attribute(&resolved, request),
			operation => {
				let entry = resolved
					.operation(operation)
					.filter(|entry| entry.entry_type() == EntryType::Public || request.origin == DispatchOrigin::Internal)
					.ok_or_else(|| DispatchError::OperationNotFound {
						address: request.address.clone(),
						operation: operation.to_string(),
					})?;
				tracing::trace!(address = %request.address, operation, "invoking operation handler");
				Ok(entry.handler().execute(&context(&resolved, request))?)
			}
		}
	}
}

fn context<'a>(resolved: &'a ResolvedRegistration, request: &'a OperationRequest) -> OperationContext<'a> {
	OperationContext {
		address: &request.address,
		operation: &request.operation,
		params: &request.params,
		override_name: resolved.override_name(),
	}
}

fn attribute_name(request: &OperationRequest) -> Result<&str, DispatchError> {
	request
		.param("name")
		.and_then(Value::as_str)
		.ok_or_else(|| DispatchError::MissingParameter {
			operation: request.operation.clone(),
			name: "name",
		})
}

fn read_attribute(resolved: &ResolvedRegistration, request: &OperationRequest) -> Result<Value, DispatchError> {
	let name = attribute_name(request)?;
	let attribute = resolved.attribute(name).ok_or_else(|| DispatchError::AttributeNotFound {
		address: request.address.clone(),
		name: name.to_string(),
	})?;
	let handler = attribute.read_handler().ok_or_else(|| DispatchError::NoReadHandler {
		address: request.address.clone(),
		name: name.to_string(),
	})?;
	Ok(handler.execute(&context(resolved, request))?)
}

fn write_attribute(resolved: &ResolvedRegistration, request: &OperationRequest) -> Result<Value, DispatchError> {
	let name = attribute_name(request)?;
	let attribute = resolved.attribute(name).ok_or_else(|| DispatchError::AttributeNotFound {
		address: request.address.clone(),
		name: name.to_string(),
	})?;
	let handler = attribute
		.write_handler()
		.filter(|_| attribute.is_writable())
		.ok_or_else(|| DispatchError::NotWritable {
			address: request.address.clone(),
			name: name.to_string(),
		})?;
	if request.param("value").is_none() {
		return Err(DispatchError::MissingParameter {
			operation: request.operation.clone(),
			name: "value",
		});
	}
	tracing::debug!(address = %request.address, attribute = name, "writing attribute");
	Ok(handler.execute(&context(resolved, request))?)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use keel_address::PathElement;
	use serde_json::json;

	use super::*;
	use crate::access::Caller;
	use crate::config::RegistryConfig;
	use crate::definition::SimpleResourceDefinition;
	use crate::descriptor::{AttributeFlags, OperationEntry, handler};
	use crate::proxy::{ProxyController, ProxyRequest};
	use crate::tree::ManagementRegistry;

	fn addr(text: &str) -> PathAddress {
		text.parse().expect("valid address")
	}

	fn element(text: &str) -> PathElement {
		text.parse().expect("valid element")
	}

	struct Echo;

	impl ProxyController for Echo {
		fn execute(&self, request: &ProxyRequest<'_>) -> Result<Value, HandlerError> {
			Ok(json!({
				"proxy": request.proxy_address.to_string(),
				"remaining": request.remaining.to_string(),
				"operation": request.operation,
			}))
		}
	}

	fn registry(writes: Arc<AtomicUsize>) -> ManagementRegistry {
		let root = SimpleResourceDefinition::root("server").with_operations(|reg| {
			reg.register_operation_handler(
				OperationEntry::new("whoami", handler(|ctx| Ok(json!(ctx.address.to_string()))))?.inherited(),
			)
		});
		let registry = ManagementRegistry::new(&root, RegistryConfig::default()).expect("root");
		let caller = Caller::privileged("test");
		let logger = SimpleResourceDefinition::new(element("logger=*"), "logger")
			.with_attributes(move |reg| {
				let writes = writes.clone();
				reg.register_read_write_attribute(
					"level",
					Some(handler(|_| Ok(json!("INFO")))),
					handler(move |ctx| {
						writes.fetch_add(1, Ordering::SeqCst);
						Ok(ctx.params["value"].clone())
					}),
					AttributeFlags::empty(),
				)?;
				reg.register_read_only_attribute("category", None, AttributeFlags::empty())?;
				reg.register_metric("count", handler(|_| Ok(json!(7))), AttributeFlags::empty())
			})
			.with_operations(|reg| {
				reg.register_operation_handler(
					OperationEntry::new("flush", handler(|ctx| Ok(json!(ctx.override_name))))?.private(),
				)?;
				reg.register_operation_handler(OperationEntry::new(
					"fail",
					handler(|_| Err(HandlerError::new("disk full"))),
				)?)
			});
		registry
			.register_sub_model(&caller, &addr("/subsystem=logging/logger=*"), &logger)
			.expect("logger");
		registry
			.register_proxy_controller(&caller, &addr("/host=remote1"), Arc::new(Echo))
			.expect("proxy");
		registry
	}

	fn dispatcher(registry: &ManagementRegistry) -> Dispatcher {
		Dispatcher::new(registry.read_view(&Caller::reader("client")))
	}

	/// Attribute reads go through the read or metric handler.
	#[test]
	fn test_read_attribute() {
		let registry = registry(Arc::default());
		let dispatcher = dispatcher(&registry);
		let read = |name: &str| {
			dispatcher.dispatch(
				&OperationRequest::new(addr("/subsystem=logging/logger=app"), READ_ATTRIBUTE)
					.with_params(json!({ "name": name })),
			)
		};
		assert_eq!(read("level").expect("level"), json!("INFO"));
		assert_eq!(read("count").expect("metric"), json!(7));
		assert!(matches!(read("category"), Err(DispatchError::NoReadHandler { .. })));
		assert!(matches!(read("missing"), Err(DispatchError::AttributeNotFound { .. })));
	}

	/// Writes are only accepted for read-write attributes and need a value.
	#[test]
	fn test_write_attribute() {
		let writes = Arc::new(AtomicUsize::new(0));
		let registry = registry(writes.clone());
		let dispatcher = dispatcher(&registry);
		let target = addr("/subsystem=logging/logger=app");

		let written = dispatcher
			.dispatch(
				&OperationRequest::new(target.clone(), WRITE_ATTRIBUTE).with_params(json!({ "name": "level", "value": "DEBUG" })),
			)
			.expect("write");
		assert_eq!(written, json!("DEBUG"));
		assert_eq!(writes.load(Ordering::SeqCst), 1);

		let rejected = dispatcher
			.dispatch(&OperationRequest::new(target.clone(), WRITE_ATTRIBUTE).with_params(json!({ "name": "count", "value": 1 })));
		assert!(matches!(rejected, Err(DispatchError::NotWritable { .. })));

		let missing = dispatcher.dispatch(&OperationRequest::new(target, WRITE_ATTRIBUTE).with_params(json!({ "name": "level" })));
		assert!(matches!(missing, Err(DispatchError::MissingParameter { name: "value", .. })));
		assert_eq!(writes.load(Ordering::SeqCst), 1);
	}

	/// Inherited operations are invokable beneath the registration that declares them.
	#[test]
	fn test_inherited_operation_dispatch() {
		let registry = registry(Arc::default());
		let out = dispatcher(&registry)
			.dispatch(&OperationRequest::new(addr("/subsystem=logging/logger=app"), "whoami"))
			.expect("inherited");
		assert_eq!(out, json!("/subsystem=logging/logger=app"));
	}

	/// Private operations are hidden from external requesters.
	#[test]
	fn test_private_operation_requires_internal_origin() {
		let registry = registry(Arc::default());
		let dispatcher = dispatcher(&registry);
		let request = OperationRequest::new(addr("/subsystem=logging/logger=app"), "flush");
		assert!(matches!(
			dispatcher.dispatch(&request),
			Err(DispatchError::OperationNotFound { .. })
		));
		assert_eq!(dispatcher.dispatch(&request.internal()).expect("internal"), json!(null));
	}

	/// Handler failures reach the requester unchanged.
	#[test]
	fn test_handler_error_propagates() {
		let registry = registry(Arc::default());
		let err = dispatcher(&registry)
			.dispatch(&OperationRequest::new(addr("/subsystem=logging/logger=app"), "fail"))
			.expect_err("handler failure");
		match err {
			DispatchError::Handler(inner) => assert_eq!(inner.message(), "disk full"),
			other => panic!("unexpected error: {other:?}"),
		}
	}

	/// Requests beneath a proxy are forwarded with the remaining address.
	#[test]
	fn test_proxy_forwarding() {
		let registry = registry(Arc::default());
		let out = dispatcher(&registry)
			.dispatch(&OperationRequest::new(addr("/host=remote1/server=main"), "read-resource"))
			.expect("forwarded");
		assert_eq!(
			out,
			json!({ "proxy": "/host=remote1", "remaining": "/server=main", "operation": "read-resource" })
		);
	}

	#[test]
	fn test_unknown_resource() {
		let registry = registry(Arc::default());
		let err = dispatcher(&registry)
			.dispatch(&OperationRequest::new(addr("/subsystem=mail"), READ_ATTRIBUTE))
			.expect_err("not found");
		assert!(matches!(err, DispatchError::ResourceNotFound { .. }));
	}

	/// A caller without read permission is refused before resolution.
	#[test]
	fn test_dispatch_requires_read() {
		let registry = registry(Arc::default());
		let dispatcher = Dispatcher::new(registry.read_view(&Caller::new("anon", crate::access::PermissionSet::empty())));
		let err = dispatcher
			.dispatch(&OperationRequest::new(addr("/subsystem=logging"), "whoami"))
			.expect_err("denied");
		assert!(matches!(err, DispatchError::Registry(RegistryError::PermissionDenied { .. })));
	}
}
