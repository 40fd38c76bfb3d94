use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::SharedHandler;
use crate::error::RegistryError;

/// How an attribute may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
	ReadOnly,
	ReadWrite,
	/// Runtime measurement; never writable.
	Metric,
}

/// Where an attribute's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Storage {
	/// Part of the persisted configuration model.
	Configuration,
	/// Only exists in the running process.
	Runtime,
}

bitflags::bitflags! {
	/// Modifiers describing an attribute.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct AttributeFlags: u8 {
		/// Value lives in runtime state rather than the configuration model.
		const STORAGE_RUNTIME = 1 << 0;
		/// Changing the value only takes effect after a process restart.
		const RESTART_REQUIRED = 1 << 1;
		/// Changing the value requires restarting all services.
		const RESTART_ALL_SERVICES = 1 << 2;
		/// Changing the value requires restarting the resource's own services.
		const RESTART_RESOURCE_SERVICES = 1 << 3;
		/// The attribute is an alias of another attribute.
		const ALIAS = 1 << 4;
	}
}

/// Descriptor of one registered attribute.
///
/// The constructors encode the access-mode invariants: read-write attributes always
/// carry a write handler, metrics always carry a read handler and never a write
/// handler, read-only attributes never carry a write handler.
#[derive(Clone)]
pub struct AttributeAccess {
	name: Arc<str>,
	access: AccessType,
	storage: Storage,
	flags: AttributeFlags,
	read_handler: Option<SharedHandler>,
	write_handler: Option<SharedHandler>,
}

impl AttributeAccess {
	/// A read-only attribute. Without a read handler the model layer's default read applies.
	pub fn read_only(name: &str, read_handler: Option<SharedHandler>, flags: AttributeFlags) -> Result<Self, RegistryError> {
		Self::build(name, AccessType::ReadOnly, flags, read_handler, None)
	}

	pub fn read_write(
		name: &str,
		read_handler: Option<SharedHandler>,
		write_handler: SharedHandler,
		flags: AttributeFlags,
	) -> Result<Self, RegistryError> {
		Self::build(name, AccessType::ReadWrite, flags, read_handler, Some(write_handler))
	}

	/// A metric. Metrics are always runtime storage.
	pub fn metric(name: &str, metric_handler: SharedHandler, flags: AttributeFlags) -> Result<Self, RegistryError> {
		Self::build(name, AccessType::Metric, flags | AttributeFlags::STORAGE_RUNTIME, Some(metric_handler), None)
	}

	fn build(
		name: &str,
		access: AccessType,
		flags: AttributeFlags,
		read_handler: Option<SharedHandler>,
		write_handler: Option<SharedHandler>,
	) -> Result<Self, RegistryError> {
		if name.is_empty() {
			return Err(RegistryError::IllegalArgument("attribute name must not be empty".into()));
		}
		let storage = if flags.contains(AttributeFlags::STORAGE_RUNTIME) {
			Storage::Runtime
		} else {
			Storage::Configuration
		};
		Ok(Self {
			name: Arc::from(name),
			access,
			storage,
			flags,
			read_handler,
			write_handler,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn shared_name(&self) -> Arc<str> {
		self.name.clone()
	}

	pub fn access_type(&self) -> AccessType {
		self.access
	}

	pub fn storage(&self) -> Storage {
		self.storage
	}

	pub fn flags(&self) -> AttributeFlags {
		self.flags
	}

	pub fn read_handler(&self) -> Option<&SharedHandler> {
		self.read_handler.as_ref()
	}

	pub fn write_handler(&self) -> Option<&SharedHandler> {
		self.write_handler.as_ref()
	}

	pub fn is_writable(&self) -> bool {
		self.access == AccessType::ReadWrite
	}
}

impl fmt::Debug for AttributeAccess {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AttributeAccess")
			.field("name", &self.name)
			.field("access", &self.access)
			.field("storage", &self.storage)
			.field("flags", &self.flags)
			.field("read_handler", &self.read_handler.is_some())
			.field("write_handler", &self.write_handler.is_some())
			.finish()
	}
}
