//! Management resource registry.
//!
//! A hierarchical, concurrently mutable index of every manageable resource type,
//! keyed by [`PathAddress`]. Each registration carries the attributes and operations
//! of its resource type and the child types beneath it; wildcard registrations
//! describe every instance of a key, optionally refined by named override models.
//! Alias registrations redirect to another address and proxy registrations hand
//! whole subtrees to a remote controller.
//!
//! # Layout
//!
//! - [`tree`] - registration nodes, handles and the [`ManagementRegistry`] itself
//! - [`resolve`] - address resolution and pinned [`ResolvedRegistration`]s
//! - [`descriptor`] - attribute and operation descriptors and handler traits
//! - [`view`] - read capability and introspection
//! - [`dispatch`] - routing of operation requests to handlers
//! - [`extension`] - subsystem bootstrap
//!
//! # Example
//!
//! ```
//! use keel_registry::{
//! 	AttributeFlags, Caller, ManagementRegistry, PathAddress, PathElement, RegistryConfig,
//! 	SimpleResourceDefinition,
//! };
//!
//! let root = SimpleResourceDefinition::root("server");
//! let registry = ManagementRegistry::new(&root, RegistryConfig::default())?;
//! let caller = Caller::privileged("admin");
//!
//! let logger = SimpleResourceDefinition::new(PathElement::wildcard("logger")?, "A logger")
//! 	.with_attributes(|reg| reg.register_read_only_attribute("level", None, AttributeFlags::empty()));
//! let address: PathAddress = "/subsystem=logging/logger=*".parse()?;
//! registry.register_sub_model(&caller, &address, &logger)?;
//!
//! let resolution = registry.resolve(&caller, &"/subsystem=logging/logger=app".parse()?)?;
//! let resolved = resolution.registration().expect("wildcard registration");
//! assert_eq!(resolved.registration_address(), &address);
//! assert!(resolved.attribute("level").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod access;
pub mod alias;
pub mod config;
pub mod definition;
pub mod describe;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod proxy;
pub mod resolve;
pub mod tree;
pub mod view;

#[cfg(any(test, doc))]
pub(crate) mod invariants;

pub use access::{Caller, Permission, PermissionSet};
pub use alias::AliasEntry;
pub use config::{ConfigError, RegistryConfig};
pub use definition::{ResourceDefinition, SimpleResourceDefinition};
pub use describe::{AttributeDescription, OperationDescription, ResourceDescription};
pub use descriptor::{
	AccessType, AttributeAccess, AttributeFlags, EntryType, HandlerError, OperationContext,
	OperationEntry, OperationFlags, OperationHandler, SharedHandler, Storage, handler,
};
pub use dispatch::{
	DispatchError, DispatchOrigin, Dispatcher, OperationRequest, READ_ATTRIBUTE, WRITE_ATTRIBUTE,
};
pub use error::{ErrorKind, IllegalStateReason, Registered, RegistryError, Result};
pub use extension::{
	Extension, ExtensionContext, ExtensionRegistry, SUBSYSTEM, SubsystemInfo,
	SubsystemRegistration, SubsystemVersion,
};
pub use keel_address::{AddressError, PathAddress, PathElement};
pub use proxy::{ProxyController, ProxyHandoff, ProxyRequest, SharedProxy};
pub use resolve::{Resolution, ResolvedRegistration};
pub use tree::{ManagementRegistry, ResourceRegistration};
pub use view::ReadView;
