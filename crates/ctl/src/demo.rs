//! A small management model to explore from the command line.
//!
//! Two extensions contribute `subsystem=logging` and `subsystem=web`; the logger
//! wildcard carries a `root` override, `host=remote1` is owned by a stand-in
//! remote controller, and `log=*` aliases the logger wildcard.

use std::sync::Arc;

use keel_registry::{
	AliasEntry, AttributeFlags, Caller, Extension, ExtensionContext, ExtensionRegistry, HandlerError,
	ManagementRegistry, OperationEntry, OperationFlags, PathAddress, PathElement, ProxyController,
	ProxyRequest, RegistryConfig, RegistryError, SimpleResourceDefinition, handler,
};
use serde_json::{Value, json};

pub const LOGGING_MODULE: &str = "org.keel.logging";
pub const WEB_MODULE: &str = "org.keel.web";

fn element(key: &str, value: &str) -> Result<PathElement, RegistryError> {
	Ok(PathElement::new(key, value)?)
}

fn address(text: &str) -> Result<PathAddress, RegistryError> {
	Ok(text.parse()?)
}

/// Echoes the written value back, the demo model keeps no state.
fn echo_write() -> keel_registry::SharedHandler {
	handler(|ctx| {
		ctx.params
			.get("value")
			.cloned()
			.ok_or_else(|| HandlerError::new("missing value"))
	})
}

fn constant(value: Value) -> keel_registry::SharedHandler {
	handler(move |_| Ok(value.clone()))
}

struct LoggingExtension;

impl Extension for LoggingExtension {
	fn module_name(&self) -> &str {
		LOGGING_MODULE
	}

	fn initialize(&self, context: &mut ExtensionContext<'_>) -> Result<(), RegistryError> {
		let subsystem = context.register_subsystem("logging", 1, 0, 0)?;
		let logging = SimpleResourceDefinition::new(element("subsystem", "logging")?, "The logging subsystem")
			.with_attributes(|reg| {
				reg.register_read_write_attribute(
					"default-level",
					Some(constant(json!("INFO"))),
					echo_write(),
					AttributeFlags::RESTART_RESOURCE_SERVICES,
				)
			})
			.with_children(|reg| reg.register_child_type("handler"));
		let logging = subsystem.register_subsystem_model(&logging)?;

		let logger = SimpleResourceDefinition::new(element("logger", "*")?, "A named logger").with_attributes(|reg| {
			reg.register_read_write_attribute("level", Some(constant(json!("INFO"))), echo_write(), AttributeFlags::empty())
		});
		let logger = logging.register_sub_model(&logger)?;

		let root_logger = SimpleResourceDefinition::root("The root logger").with_attributes(|reg| {
			reg.register_metric("active-loggers", constant(json!(3)), AttributeFlags::empty())
		});
		logger.register_override_model("root", &root_logger)?;
		logging.register_alias(element("log", "*")?, AliasEntry::new(address("/subsystem=logging/logger=*")?))?;
		Ok(())
	}
}

struct WebExtension;

impl Extension for WebExtension {
	fn module_name(&self) -> &str {
		WEB_MODULE
	}

	fn initialize(&self, context: &mut ExtensionContext<'_>) -> Result<(), RegistryError> {
		let subsystem = context.register_subsystem("web", 2, 1, 0)?;
		let web = SimpleResourceDefinition::new(element("subsystem", "web")?, "The web subsystem").with_operations(|reg| {
			reg.register_operation_handler(
				OperationEntry::new("flush-sessions", constant(Value::Null))?
					.with_flags(OperationFlags::RUNTIME_ONLY)
					.with_description("Drops every open session"),
			)
		});
		let web = subsystem.register_subsystem_model(&web)?;

		let connector = SimpleResourceDefinition::new(element("connector", "*")?, "A listening connector")
			.runtime_only()
			.with_attributes(|reg| {
				reg.register_read_only_attribute("port", Some(constant(json!(8080))), AttributeFlags::empty())?;
				reg.register_metric("requests", constant(json!(0)), AttributeFlags::empty())
			});
		web.register_sub_model(&connector)?;
		Ok(())
	}
}

/// Stand-in for a remote host controller; answers every request locally.
struct RemoteHost;

impl ProxyController for RemoteHost {
	fn execute(&self, request: &ProxyRequest<'_>) -> Result<Value, HandlerError> {
		tracing::debug!(proxy = %request.proxy_address, remaining = %request.remaining, "forwarding request");
		Ok(json!({
			"forwarded-to": request.proxy_address.to_string(),
			"address": request.remaining.to_string(),
			"operation": request.operation,
		}))
	}
}

/// Builds the demo registry with both extensions installed.
pub fn build(config: RegistryConfig, caller: &Caller) -> Result<ExtensionRegistry, RegistryError> {
	let root = SimpleResourceDefinition::root("keel demo server").with_operations(|reg| {
		reg.register_operation_handler(
			OperationEntry::new(
				"whoami",
				handler(|ctx| Ok(json!({ "address": ctx.address.to_string(), "override": ctx.override_name }))),
			)?
			.inherited()
			.with_flags(OperationFlags::READ_ONLY),
		)
	});
	let extensions = ExtensionRegistry::new(ManagementRegistry::new(&root, config)?);
	extensions.add_extension(caller, &LoggingExtension)?;
	extensions.add_extension(caller, &WebExtension)?;
	extensions
		.registry()
		.register_proxy_controller(caller, &address("/host=remote1")?, Arc::new(RemoteHost))?;
	tracing::info!(modules = extensions.module_names().len(), "demo registry ready");
	Ok(extensions)
}

#[cfg(test)]
mod tests {
	use keel_registry::{Dispatcher, OperationRequest, Resolution};
	use pretty_assertions::assert_eq;

	use super::*;

	fn demo() -> (ExtensionRegistry, Caller) {
		let caller = Caller::privileged("test");
		let extensions = build(RegistryConfig::default(), &caller).expect("demo registry");
		(extensions, caller)
	}

	#[test]
	fn test_demo_installs_both_subsystems() {
		let (extensions, _) = demo();
		assert_eq!(extensions.module_names(), vec![LOGGING_MODULE, WEB_MODULE]);
		let web = extensions.subsystems(WEB_MODULE).expect("web module");
		assert_eq!(web[0].version.to_string(), "2.1.0");
	}

	#[test]
	fn test_demo_resolutions() {
		let (extensions, caller) = demo();
		let registry = extensions.registry();
		let resolve = |text: &str| registry.resolve(&caller, &text.parse().expect("address")).expect("resolve");

		let root_logger = resolve("/subsystem=logging/logger=root");
		assert_eq!(root_logger.registration().and_then(|r| r.override_name()), Some("root"));

		let aliased = resolve("/subsystem=logging/log=app");
		assert_eq!(
			aliased.registration().map(|r| r.registration_address().to_string()),
			Some("/subsystem=logging/logger=*".to_string())
		);

		let Resolution::Proxy(handoff) = resolve("/host=remote1/server=main") else {
			panic!("expected a proxy handoff");
		};
		assert_eq!(handoff.remaining().to_string(), "/server=main");

		assert!(resolve("/subsystem=web/connector=http").registration().is_some_and(|r| r.is_runtime_only()));
	}

	#[test]
	fn test_demo_dispatch() {
		let (extensions, caller) = demo();
		let dispatcher = Dispatcher::new(extensions.registry().read_view(&caller));
		let request = OperationRequest::new("/subsystem=web/connector=http".parse().expect("address"), "whoami");
		assert_eq!(
			dispatcher.dispatch(&request).expect("inherited operation"),
			json!({ "address": "/subsystem=web/connector=http", "override": null })
		);
	}
}
