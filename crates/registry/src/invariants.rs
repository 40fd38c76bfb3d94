#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use keel_address::{PathAddress, PathElement};

use crate::access::Caller;
use crate::config::RegistryConfig;
use crate::definition::SimpleResourceDefinition;
use crate::descriptor::AttributeFlags;
use crate::error::{ErrorKind, RegistryError};
use crate::resolve::Resolution;
use crate::tree::ManagementRegistry;

fn registry() -> ManagementRegistry {
	match ManagementRegistry::new(&SimpleResourceDefinition::root("root"), RegistryConfig::default()) {
		Ok(registry) => registry,
		Err(err) => panic!("root registration failed: {err}"),
	}
}

fn addr(text: &str) -> PathAddress {
	match text.parse() {
		Ok(address) => address,
		Err(err) => panic!("bad address {text}: {err}"),
	}
}

fn element(key: &str, value: &str) -> PathElement {
	match PathElement::new(key, value) {
		Ok(element) => element,
		Err(err) => panic!("bad element {key}={value}: {err}"),
	}
}

/// A definition registering one attribute named `marker`.
fn marked(element: PathElement) -> SimpleResourceDefinition {
	SimpleResourceDefinition::new(element, "marked")
		.with_attributes(|reg| reg.register_read_only_attribute("marker", None, AttributeFlags::empty()))
}

/// Invariant: Concurrent writers on one node never lose each other's updates.
pub(crate) fn inv_sibling_registrations_not_lost() {
	let registry = registry();
	let caller = Caller::privileged("writer");
	let root = registry.root(&caller);

	thread::scope(|scope| {
		for worker in 0..8 {
			let root = root.clone();
			scope.spawn(move || {
				for i in 0..40 {
					let child = marked(element("child", &format!("{worker}-{i}")));
					if let Err(err) = root.register_sub_model(&child) {
						panic!("sibling registration failed: {err}");
					}
					let attribute = format!("attr-{worker}-{i}");
					if let Err(err) = root.register_read_only_attribute(&attribute, None, AttributeFlags::empty()) {
						panic!("attribute registration failed: {err}");
					}
				}
			});
		}
	});

	assert_eq!(root.child_addresses().len(), 8 * 40);
	assert_eq!(root.attribute_names().len(), 8 * 40);
}

#[cfg_attr(test, test)]
pub(crate) fn test_sibling_registrations_not_lost() {
	inv_sibling_registrations_not_lost()
}

/// Invariant: A resolution keeps answering from the snapshots it pinned.
///
/// Unregistering after resolution MUST NOT change what the resolved registration
/// reports, while a fresh resolution MUST observe the removal.
pub(crate) fn inv_resolution_pins_snapshot() {
	let registry = registry();
	let caller = Caller::privileged("t");
	let address = addr("/subsystem=web/connector=http");
	if let Err(err) = registry.register_sub_model(&caller, &address, &marked(element("connector", "http"))) {
		panic!("registration failed: {err}");
	}

	let Resolution::Registration(pinned) = registry.resolve(&caller, &address).unwrap_or(Resolution::NotFound) else {
		panic!("expected a registration at {address}");
	};
	if let Err(err) = registry.unregister_sub_model(&caller, &addr("/subsystem=web")) {
		panic!("unregister failed: {err}");
	}

	assert!(pinned.attribute("marker").is_some());
	assert_eq!(pinned.registration_address(), &address);
	assert!(matches!(registry.resolve(&caller, &address), Ok(Resolution::NotFound)));
}

#[cfg_attr(test, test)]
pub(crate) fn test_resolution_pins_snapshot() {
	inv_resolution_pins_snapshot()
}

/// Invariant: A writer racing the removal of its node fails with `Removed` once the
/// removal has happened, and never resurrects the node.
pub(crate) fn inv_writer_racing_removal_fails_cleanly() {
	let registry = registry();
	let caller = Caller::privileged("t");
	let address = addr("/a=1/b=1");
	let handle = match registry.register_sub_model(&caller, &address, &marked(element("b", "1"))) {
		Ok(handle) => handle,
		Err(err) => panic!("registration failed: {err}"),
	};
	let started = AtomicBool::new(false);

	let writer_error = thread::scope(|scope| {
		let writer = scope.spawn(|| {
			let mut i = 0usize;
			loop {
				started.store(true, Ordering::Release);
				let outcome = handle.register_read_only_attribute(&format!("attr-{i}"), None, AttributeFlags::empty());
				if let Err(err) = outcome {
					return err;
				}
				i += 1;
			}
		});
		while !started.load(Ordering::Acquire) {
			std::hint::spin_loop();
		}
		if let Err(err) = registry.unregister_sub_model(&caller, &addr("/a=1")) {
			panic!("unregister failed: {err}");
		}
		match writer.join() {
			Ok(err) => err,
			Err(_) => panic!("writer panicked"),
		}
	});

	assert_eq!(writer_error.kind(), ErrorKind::Removed);
	assert!(handle.is_removed());
	let late = handle.register_sub_model(&marked(element("c", "1")));
	assert!(matches!(late, Err(RegistryError::Removed { .. })));
	assert!(matches!(registry.resolve(&caller, &address), Ok(Resolution::NotFound)));
}

#[cfg_attr(test, test)]
pub(crate) fn test_writer_racing_removal_fails_cleanly() {
	inv_writer_racing_removal_fails_cleanly()
}

/// Invariant: A registration that fails part-way publishes nothing, intermediate
/// nodes and children registered by its hooks included.
pub(crate) fn inv_failed_registration_leaves_no_partial_nodes() {
	let registry = registry();
	let caller = Caller::privileged("t");
	let failing = SimpleResourceDefinition::new(element("c", "3"), "fails")
		.with_children(|reg| {
			reg.register_sub_model(&marked(element("d", "4")))?;
			Err(RegistryError::IllegalArgument("hook failure".to_string()))
		});

	let outcome = registry.register_sub_model(&caller, &addr("/a=1/b=2/c=3"), &failing);
	assert!(matches!(outcome, Err(RegistryError::IllegalArgument(_))));
	for address in ["/a=1", "/a=1/b=2", "/a=1/b=2/c=3", "/a=1/b=2/c=3/d=4"] {
		assert!(
			matches!(registry.resolve(&caller, &addr(address)), Ok(Resolution::NotFound)),
			"{address} must not be visible"
		);
	}
	assert!(registry.root(&caller).child_addresses().is_empty());
}

#[cfg_attr(test, test)]
pub(crate) fn test_failed_registration_leaves_no_partial_nodes() {
	inv_failed_registration_leaves_no_partial_nodes()
}

/// Invariant: Readers never observe a half-populated registration.
///
/// Every resolution racing repeated register/unregister cycles either finds
/// nothing or finds the registration with the attribute its definition registers.
pub(crate) fn inv_readers_never_see_partial_registration() {
	let registry = registry();
	let caller = Caller::privileged("t");
	let address = addr("/subsystem=io/worker=default");
	let done = AtomicBool::new(false);

	thread::scope(|scope| {
		for _ in 0..4 {
			scope.spawn(|| {
				while !done.load(Ordering::Acquire) {
					match registry.resolve(&caller, &address) {
						Ok(Resolution::Registration(resolved)) => {
							assert!(resolved.attribute("marker").is_some(), "observed a partial registration");
						}
						Ok(Resolution::NotFound) => {}
						other => panic!("unexpected resolution: {other:?}"),
					}
				}
			});
		}
		for _ in 0..200 {
			if let Err(err) = registry.register_sub_model(&caller, &address, &marked(element("worker", "default"))) {
				panic!("registration failed: {err}");
			}
			if let Err(err) = registry.unregister_sub_model(&caller, &addr("/subsystem=io")) {
				panic!("unregister failed: {err}");
			}
		}
		done.store(true, Ordering::Release);
	});
}

#[cfg_attr(test, test)]
pub(crate) fn test_readers_never_see_partial_registration() {
	inv_readers_never_see_partial_registration()
}
