use std::sync::Arc;

use keel_address::{PathAddress, PathElement};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::access::Caller;
use crate::alias::AliasEntry;
use crate::definition::SimpleResourceDefinition;
use crate::descriptor::{AttributeFlags, HandlerError, OperationEntry, SharedHandler, handler};
use crate::error::RegistryError;
use crate::proxy::{ProxyController, ProxyRequest};
use crate::tree::ManagementRegistry;

fn addr(text: &str) -> PathAddress {
	text.parse().expect("valid address")
}

fn element(text: &str) -> PathElement {
	text.parse().expect("valid element")
}

fn noop() -> SharedHandler {
	handler(|_| Ok(Value::Null))
}

fn admin() -> Caller {
	Caller::privileged("admin")
}

struct Remote;

impl ProxyController for Remote {
	fn execute(&self, _request: &ProxyRequest<'_>) -> Result<Value, HandlerError> {
		Ok(json!("remote"))
	}
}

fn attributes(element_text: &str, names: &'static [&'static str]) -> SimpleResourceDefinition {
	SimpleResourceDefinition::new(element(element_text), element_text).with_attributes(move |reg| {
		for name in names {
			reg.register_read_only_attribute(name, None, AttributeFlags::empty())?;
		}
		Ok(())
	})
}

fn registry() -> ManagementRegistry {
	let root = SimpleResourceDefinition::root("root").with_operations(|reg| {
		reg.register_operation_handler(OperationEntry::new("describe", noop())?.inherited())?;
		reg.register_operation_handler(OperationEntry::new("status", noop())?.inherited())?;
		reg.register_operation_handler(OperationEntry::new("reload", noop())?)
	});
	ManagementRegistry::new(&root, RegistryConfig::default()).expect("root")
}

fn resolved(registry: &ManagementRegistry, text: &str) -> ResolvedRegistration {
	match registry.resolve(&admin(), &addr(text)).expect("resolve") {
		Resolution::Registration(resolved) => resolved,
		other => panic!("expected a registration at {text}, got {other:?}"),
	}
}

fn is_not_found(registry: &ManagementRegistry, text: &str) -> bool {
	registry.resolve(&admin(), &addr(text)).expect("resolve").is_not_found()
}

#[test]
fn test_root_resolves_to_root() {
	let registry = registry();
	let root = resolved(&registry, "/");
	assert!(root.registration_address().is_root());
	assert_eq!(root.description(), "root");
}

#[rstest]
#[case::exact_first(true)]
#[case::wildcard_first(false)]
fn test_exact_beats_wildcard(#[case] exact_first: bool) {
	let registry = registry();
	let caller = admin();
	let exact = attributes("db=primary", &["exact"]);
	let wildcard = attributes("db=*", &["any"]);
	let order: [&SimpleResourceDefinition; 2] = if exact_first { [&exact, &wildcard] } else { [&wildcard, &exact] };
	for definition in order {
		registry
			.root(&caller)
			.register_sub_model(definition)
			.expect("register");
	}

	let primary = resolved(&registry, "/db=primary");
	assert_eq!(primary.registration_address(), &addr("/db=primary"));
	assert_eq!(primary.attribute_names(), vec!["exact"]);

	let other = resolved(&registry, "/db=replica");
	assert_eq!(other.registration_address(), &addr("/db=*"));
	assert_eq!(other.address(), &addr("/db=replica"));
	assert_eq!(other.attribute_names(), vec!["any"]);
}

#[test]
fn test_override_applies_only_through_wildcard() {
	let registry = registry();
	let caller = admin();
	let root = registry.root(&caller);
	let wildcard = root.register_sub_model(&attributes("db=*", &["url"])).expect("wildcard");
	let tuned = SimpleResourceDefinition::root("tuned db").with_attributes(|reg| {
		reg.register_read_only_attribute("pool-size", None, AttributeFlags::empty())
	});
	wildcard.register_override_model("tuned", &tuned).expect("override");

	let through = resolved(&registry, "/db=tuned");
	assert_eq!(through.override_name(), Some("tuned"));
	assert_eq!(through.registration_address(), &addr("/db=*"));
	assert_eq!(through.attribute_names(), vec!["pool-size", "url"]);
	assert_eq!(through.description(), "tuned db");
	assert!(through.is_same_node(&wildcard));

	// the wildcard itself is never overridden
	let literal = resolved(&registry, "/db=*");
	assert_eq!(literal.override_name(), None);
	assert_eq!(literal.attribute_names(), vec!["url"]);

	// an exact registration named like the override wins
	root.register_sub_model(&attributes("db=tuned", &["exact"])).expect("exact");
	let exact = resolved(&registry, "/db=tuned");
	assert_eq!(exact.override_name(), None);
	assert_eq!(exact.attribute_names(), vec!["exact"]);
}

#[test]
fn test_children_of_override_and_wildcard() {
	let registry = registry();
	let caller = admin();
	let wildcard = registry
		.root(&caller)
		.register_sub_model(&attributes("db=*", &[]))
		.expect("wildcard");
	wildcard.register_sub_model(&attributes("table=*", &["rows"])).expect("table");
	let special = wildcard
		.register_override_model("special", &SimpleResourceDefinition::root(""))
		.expect("override");
	special.register_sub_model(&attributes("index=*", &["unique"])).expect("index");

	let table = resolved(&registry, "/db=special/table=t1");
	assert_eq!(table.registration_address(), &addr("/db=*/table=*"));
	let index = resolved(&registry, "/db=special/index=i1");
	assert_eq!(index.registration_address(), &addr("/db=special/index=*"));
	assert!(is_not_found(&registry, "/db=plain/index=i1"));
	assert_eq!(resolved(&registry, "/db=special").child_types(), vec!["index", "table"]);
}

#[test]
fn test_attributes_not_inherited() {
	let registry = registry();
	let caller = admin();
	let parent = registry
		.root(&caller)
		.register_sub_model(&attributes("subsystem=web", &["port"]))
		.expect("parent");
	parent.register_sub_model(&attributes("server=*", &[])).expect("child");

	let child = resolved(&registry, "/subsystem=web/server=a");
	assert!(child.attribute("port").is_none());
	assert!(matches!(
		child.require_attribute("port"),
		Err(RegistryError::NotFound { .. })
	));
}

#[test]
fn test_operation_inheritance_nearest_wins() {
	let registry = registry();
	let caller = admin();
	let web = SimpleResourceDefinition::new(element("subsystem=web"), "web").with_operations(|reg| {
		reg.register_operation_handler(
			OperationEntry::new("describe", noop())?
				.inherited()
				.with_description("web describe"),
		)?;
		// not inherited, so it must not shadow the root's inherited `status`
		reg.register_operation_handler(OperationEntry::new("status", noop())?.with_description("web status"))
	});
	let web = registry.root(&caller).register_sub_model(&web).expect("web");
	web.register_sub_model(&attributes("server=*", &[])).expect("server");

	let server = resolved(&registry, "/subsystem=web/server=a");
	assert_eq!(
		server.operation("describe").and_then(|op| op.description()),
		Some("web describe")
	);
	let status = server.require_operation("status").expect("inherited from root");
	assert_eq!(status.description(), None);
	assert!(server.operation("reload").is_none());
	assert!(server.operation_names(false).is_empty());
	assert_eq!(server.operation_names(true), vec!["describe", "status"]);

	let at_web = resolved(&registry, "/subsystem=web");
	assert_eq!(at_web.require_operation("status").expect("own").description(), Some("web status"));
}

#[test]
fn test_override_operation_precedes_base() {
	let registry = registry();
	let caller = admin();
	let wildcard = registry
		.root(&caller)
		.register_sub_model(&attributes("db=*", &[]))
		.expect("wildcard");
	wildcard
		.register_operation_handler(OperationEntry::new("reload", noop()).expect("entry").with_description("base"))
		.expect("base op");
	let over = SimpleResourceDefinition::root("").with_operations(|reg| {
		reg.register_operation_handler(OperationEntry::new("reload", noop())?.with_description("override"))
	});
	wildcard.register_override_model("x", &over).expect("override");

	let through = resolved(&registry, "/db=x");
	assert_eq!(through.operation("reload").and_then(|op| op.description()), Some("override"));
	let plain = resolved(&registry, "/db=y");
	assert_eq!(plain.operation("reload").and_then(|op| op.description()), Some("base"));
}

#[rstest]
#[case::at_proxy("/host=remote1", "/")]
#[case::beneath_proxy("/host=remote1/server=main/subsystem=web", "/server=main/subsystem=web")]
fn test_proxy_handoff(#[case] requested: &str, #[case] remaining: &str) {
	let registry = registry();
	let caller = admin();
	registry
		.register_proxy_controller(&caller, &addr("/host=remote1"), Arc::new(Remote))
		.expect("proxy");

	let resolution = registry.resolve(&caller, &addr(requested)).expect("resolve");
	let handoff = resolution.proxy().expect("proxy handoff");
	assert_eq!(handoff.proxy_address(), &addr("/host=remote1"));
	assert_eq!(handoff.remaining(), &addr(remaining));
	assert_eq!(handoff.execute("read-resource", &Value::Null).expect("remote"), json!("remote"));
}

#[test]
fn test_alias_redirects_with_substitution() {
	let registry = registry();
	let caller = admin();
	let subsystem = registry
		.root(&caller)
		.register_sub_model(&attributes("subsystem=a", &[]))
		.expect("subsystem");
	subsystem.register_sub_model(&attributes("real=*", &["value"])).expect("real");
	subsystem
		.register_alias(element("alias=*"), AliasEntry::new(addr("/subsystem=a/real=*")))
		.expect("alias");

	let through_alias = resolved(&registry, "/subsystem=a/alias=x");
	assert_eq!(through_alias.address(), &addr("/subsystem=a/alias=x"));
	assert_eq!(through_alias.registration_address(), &addr("/subsystem=a/real=*"));
	assert_eq!(through_alias.attribute_names(), vec!["value"]);
}

#[test]
fn test_alias_loop_is_bounded() {
	let config = RegistryConfig {
		max_alias_hops: 4,
		..RegistryConfig::default()
	};
	let registry = ManagementRegistry::new(&SimpleResourceDefinition::root(""), config).expect("root");
	let caller = admin();
	registry
		.register_alias(&caller, &addr("/a=1"), AliasEntry::new(addr("/b=1")))
		.expect("a");
	registry
		.register_alias(&caller, &addr("/b=1"), AliasEntry::new(addr("/a=1")))
		.expect("b");
	assert!(is_not_found(&registry, "/a=1/child=x"));
}

/// Deep addresses resolve to nothing, even under a wildcard that would match them,
/// and so do aliases redirecting past the limit.
#[test]
fn test_resolution_depth_limited() {
	let config = RegistryConfig {
		max_address_depth: 2,
		..RegistryConfig::default()
	};
	let registry = ManagementRegistry::new(&SimpleResourceDefinition::root(""), config).expect("root");
	let caller = admin();
	let db = registry.root(&caller).register_sub_model(&attributes("db=*", &[])).expect("db");
	db.register_sub_model(&attributes("table=*", &["rows"])).expect("table");
	db.register_alias(element("view=*"), AliasEntry::new(addr("/db=*/table=*")))
		.expect("alias");

	assert_eq!(resolved(&registry, "/db=main/table=users").attribute_names(), vec!["rows"]);
	assert!(is_not_found(&registry, "/db=main/table=users/column=id"));
	assert!(is_not_found(&registry, "/db=main/view=v/column=id"));
}

#[test]
fn test_removed_registration_not_found() {
	let registry = registry();
	let caller = admin();
	registry
		.register_sub_model(&caller, &addr("/subsystem=web/server=*"), &attributes("server=*", &[]))
		.expect("server");
	assert!(!is_not_found(&registry, "/subsystem=web/server=a"));
	registry
		.unregister_sub_model(&caller, &addr("/subsystem=web"))
		.expect("unregister");
	for gone in ["/subsystem=web", "/subsystem=web/server=a", "/subsystem=web/server=*"] {
		assert!(is_not_found(&registry, gone), "{gone}");
	}
}

#[test]
fn test_wildcard_request_without_wildcard_registration() {
	let registry = registry();
	registry
		.root(&admin())
		.register_sub_model(&attributes("db=primary", &[]))
		.expect("exact");
	assert!(is_not_found(&registry, "/db=*"));
	assert!(is_not_found(&registry, "/db=other"));
}

#[test]
fn test_runtime_only_propagates_down() {
	let registry = registry();
	let caller = admin();
	let metrics = registry
		.root(&caller)
		.register_sub_model(&attributes("metrics=*", &[]).runtime_only())
		.expect("metrics");
	metrics
		.register_sub_model(&attributes("gauge=*", &[]).runtime_only())
		.expect("gauge");
	assert!(resolved(&registry, "/metrics=jvm/gauge=heap").is_runtime_only());
	assert!(!resolved(&registry, "/").is_runtime_only());
}
