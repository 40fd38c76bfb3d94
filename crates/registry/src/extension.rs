//! Extension bootstrap.
//!
//! An [`Extension`] contributes subsystems: each subsystem is a resource registered
//! at `subsystem=<name>` beneath the root. The [`ExtensionRegistry`] remembers which
//! module contributed which subsystems so they can be removed together.

use std::fmt;

use indexmap::IndexMap;
use keel_address::{PathAddress, PathElement};
use parking_lot::RwLock;

use crate::access::{self, Caller, Permission};
use crate::definition::ResourceDefinition;
use crate::error::{ErrorKind, Registered, RegistryError};
use crate::tree::{ManagementRegistry, ResourceRegistration};

/// Key of subsystem resources beneath the root.
pub const SUBSYSTEM: &str = "subsystem";

/// A module contributing subsystems to the registry.
pub trait Extension: Send + Sync {
	/// Unique name of the contributing module.
	fn module_name(&self) -> &str;

	fn initialize(&self, context: &mut ExtensionContext<'_>) -> Result<(), RegistryError>;
}

/// Management interface version a subsystem declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsystemVersion {
	pub major: u32,
	pub minor: u32,
	pub micro: u32,
}

impl fmt::Display for SubsystemVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemInfo {
	pub name: String,
	pub version: SubsystemVersion,
}

impl SubsystemInfo {
	pub fn address(&self) -> Result<PathAddress, RegistryError> {
		subsystem_address(&self.name)
	}
}

fn subsystem_address(name: &str) -> Result<PathAddress, RegistryError> {
	Ok(PathAddress::from(PathElement::new(SUBSYSTEM, name)?))
}

/// What an extension sees while it initializes.
pub struct ExtensionContext<'a> {
	registry: &'a ManagementRegistry,
	caller: &'a Caller,
	module: &'a str,
	claimed: &'a IndexMap<String, Vec<SubsystemInfo>>,
	subsystems: Vec<SubsystemInfo>,
}

impl<'a> ExtensionContext<'a> {
	pub fn module_name(&self) -> &str {
		self.module
	}

	/// Claims the subsystem `name` for this module.
	///
	/// Fails with [`RegistryError::DuplicateRegistration`] if any module, this one
	/// included, already claimed it.
	pub fn register_subsystem(
		&mut self,
		name: &str,
		major: u32,
		minor: u32,
		micro: u32,
	) -> Result<SubsystemRegistration<'a>, RegistryError> {
		let address = subsystem_address(name)?;
		let taken = self.subsystems.iter().any(|info| info.name == name)
			|| self.claimed.values().flatten().any(|info| info.name == name);
		if taken {
			return Err(RegistryError::duplicate(&PathAddress::root(), Registered::Subsystem, name));
		}
		let version = SubsystemVersion { major, minor, micro };
		self.subsystems.push(SubsystemInfo {
			name: name.to_string(),
			version,
		});
		tracing::debug!(module = self.module, subsystem = name, %version, "registered subsystem");
		Ok(SubsystemRegistration {
			registry: self.registry,
			caller: self.caller,
			address,
		})
	}
}

/// A claimed subsystem, ready to receive its resource model.
pub struct SubsystemRegistration<'a> {
	registry: &'a ManagementRegistry,
	caller: &'a Caller,
	address: PathAddress,
}

impl SubsystemRegistration<'_> {
	pub fn address(&self) -> &PathAddress {
		&self.address
	}

	/// Registers the subsystem's root resource. `definition` must describe the
	/// element `subsystem=<name>`.
	pub fn register_subsystem_model(&self, definition: &dyn ResourceDefinition) -> Result<ResourceRegistration, RegistryError> {
		self.registry.register_sub_model(self.caller, &self.address, definition)
	}
}

/// Tracks installed extensions and the subsystems they contributed.
pub struct ExtensionRegistry {
	registry: ManagementRegistry,
	extensions: RwLock<IndexMap<String, Vec<SubsystemInfo>>>,
}

impl ExtensionRegistry {
	pub fn new(registry: ManagementRegistry) -> Self {
		Self {
			registry,
			extensions: RwLock::new(IndexMap::new()),
		}
	}

	pub fn registry(&self) -> &ManagementRegistry {
		&self.registry
	}

	/// Initializes `extension` and records its subsystems.
	///
	/// When initialization fails every subsystem model it already registered is
	/// unregistered again before the error is returned.
	pub fn add_extension(&self, caller: &Caller, extension: &dyn Extension) -> Result<Vec<SubsystemInfo>, RegistryError> {
		access::require(self.registry.config(), caller, Permission::Access)?;
		let module = extension.module_name();
		let mut extensions = self.extensions.write();
		if extensions.contains_key(module) {
			return Err(RegistryError::duplicate(&PathAddress::root(), Registered::Extension, module));
		}

		let mut context = ExtensionContext {
			registry: &self.registry,
			caller,
			module,
			claimed: &extensions,
			subsystems: Vec::new(),
		};
		let outcome = extension.initialize(&mut context);
		let subsystems = context.subsystems;
		if let Err(err) = outcome {
			tracing::warn!(module, error = %err, "extension initialization failed, rolling back");
			self.unregister_subsystems(caller, &subsystems);
			return Err(err);
		}

		tracing::debug!(module, subsystems = subsystems.len(), "added extension");
		extensions.insert(module.to_string(), subsystems.clone());
		Ok(subsystems)
	}

	/// Removes the extension `module` and unregisters its subsystem models.
	pub fn remove_extension(&self, caller: &Caller, module: &str) -> Result<Vec<SubsystemInfo>, RegistryError> {
		access::require(self.registry.config(), caller, Permission::Access)?;
		let subsystems = self
			.extensions
			.write()
			.shift_remove(module)
			.ok_or_else(|| RegistryError::absent(&PathAddress::root(), Registered::Extension, module))?;
		self.unregister_subsystems(caller, &subsystems);
		tracing::debug!(module, subsystems = subsystems.len(), "removed extension");
		Ok(subsystems)
	}

	fn unregister_subsystems(&self, caller: &Caller, subsystems: &[SubsystemInfo]) {
		for info in subsystems {
			let outcome = info
				.address()
				.and_then(|address| self.registry.unregister_sub_model(caller, &address));
			match outcome {
				Ok(()) => {}
				// claimed but never given a model
				Err(err) if err.kind() == ErrorKind::IllegalArgument => {}
				Err(err) => tracing::warn!(subsystem = %info.name, error = %err, "failed to unregister subsystem"),
			}
		}
	}

	pub fn module_names(&self) -> Vec<String> {
		self.extensions.read().keys().cloned().collect()
	}

	pub fn subsystems(&self, module: &str) -> Option<Vec<SubsystemInfo>> {
		self.extensions.read().get(module).cloned()
	}
}

#[cfg(test)]
mod tests {
	use keel_address::PathElement;
	use rstest::rstest;

	use super::*;
	use crate::config::RegistryConfig;
	use crate::definition::SimpleResourceDefinition;
	use crate::descriptor::AttributeFlags;

	/// Registers each named subsystem with one attribute, optionally failing afterwards.
	struct TestExtension {
		module: &'static str,
		subsystems: Vec<&'static str>,
		fail_after: bool,
	}

	impl Extension for TestExtension {
		fn module_name(&self) -> &str {
			self.module
		}

		fn initialize(&self, context: &mut ExtensionContext<'_>) -> Result<(), RegistryError> {
			for name in &self.subsystems {
				let subsystem = context.register_subsystem(name, 1, 1, 1)?;
				let definition = SimpleResourceDefinition::new(PathElement::new(SUBSYSTEM, name)?, "test subsystem")
					.with_attributes(|reg| reg.register_read_only_attribute("name", None, AttributeFlags::empty()));
				subsystem.register_subsystem_model(&definition)?;
			}
			if self.fail_after {
				return Err(RegistryError::IllegalArgument("boot failure".to_string()));
			}
			Ok(())
		}
	}

	fn extensions() -> ExtensionRegistry {
		let root = SimpleResourceDefinition::root("server");
		ExtensionRegistry::new(ManagementRegistry::new(&root, RegistryConfig::default()).expect("root"))
	}

	fn resolves(extensions: &ExtensionRegistry, address: &str) -> bool {
		let address: PathAddress = address.parse().expect("valid address");
		extensions
			.registry()
			.resolve(&Caller::reader("t"), &address)
			.expect("resolve")
			.registration()
			.is_some()
	}

	#[test]
	fn test_add_extension_registers_subsystems() {
		let extensions = extensions();
		let caller = Caller::privileged("boot");
		let added = extensions
			.add_extension(&caller, &TestExtension {
				module: "org.test",
				subsystems: vec!["1", "2"],
				fail_after: false,
			})
			.expect("add");
		assert_eq!(added.len(), 2);
		assert_eq!(added[0].version.to_string(), "1.1.1");
		assert!(resolves(&extensions, "/subsystem=1"));
		assert!(resolves(&extensions, "/subsystem=2"));
		assert_eq!(extensions.module_names(), vec!["org.test".to_string()]);
	}

	#[test]
	fn test_failed_initialization_rolls_back() {
		let extensions = extensions();
		let caller = Caller::privileged("boot");
		let err = extensions
			.add_extension(&caller, &TestExtension {
				module: "org.broken",
				subsystems: vec!["1"],
				fail_after: true,
			})
			.expect_err("initialization fails");
		assert_eq!(err.kind(), ErrorKind::IllegalArgument);
		assert!(!resolves(&extensions, "/subsystem=1"));
		assert!(extensions.subsystems("org.broken").is_none());
	}

	#[rstest]
	#[case::same_module("org.test")]
	#[case::other_module("org.other")]
	fn test_duplicates_rejected(#[case] second_module: &'static str) {
		let extensions = extensions();
		let caller = Caller::privileged("boot");
		extensions
			.add_extension(&caller, &TestExtension {
				module: "org.test",
				subsystems: vec!["1"],
				fail_after: false,
			})
			.expect("first");
		let err = extensions
			.add_extension(&caller, &TestExtension {
				module: second_module,
				subsystems: vec!["1"],
				fail_after: false,
			})
			.expect_err("duplicate");
		assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
		assert!(resolves(&extensions, "/subsystem=1"));
	}

	#[test]
	fn test_remove_extension_unregisters_subsystems() {
		let extensions = extensions();
		let caller = Caller::privileged("boot");
		extensions
			.add_extension(&caller, &TestExtension {
				module: "org.test",
				subsystems: vec!["1", "2"],
				fail_after: false,
			})
			.expect("add");
		let removed = extensions.remove_extension(&caller, "org.test").expect("remove");
		assert_eq!(removed.len(), 2);
		assert!(!resolves(&extensions, "/subsystem=1"));
		assert!(!resolves(&extensions, "/subsystem=2"));
		assert_eq!(
			extensions.remove_extension(&caller, "org.test").expect_err("gone").kind(),
			ErrorKind::IllegalArgument
		);
	}

	#[test]
	fn test_reader_cannot_add_extensions() {
		let extensions = extensions();
		let err = extensions
			.add_extension(&Caller::reader("viewer"), &TestExtension {
				module: "org.test",
				subsystems: vec!["1"],
				fail_after: false,
			})
			.expect_err("denied");
		assert_eq!(err.kind(), ErrorKind::PermissionDenied);
	}
}
