use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::SharedHandler;
use crate::error::RegistryError;

/// Visibility of an operation to external requesters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
	#[default]
	Public,
	/// Only invokable by the management layer itself.
	Private,
}

bitflags::bitflags! {
	/// Operation modifiers.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct OperationFlags: u16 {
		/// Does not modify the model.
		const READ_ONLY = 1 << 0;
		/// Only touches runtime state.
		const RUNTIME_ONLY = 1 << 1;
		/// Never requires a restart.
		const RESTART_NONE = 1 << 2;
		const RESTART_ALL_SERVICES = 1 << 3;
		const RESTART_RESOURCE_SERVICES = 1 << 4;
		/// Carries deployment content.
		const DEPLOYMENT_UPLOAD = 1 << 5;
		const HOST_CONTROLLER_ONLY = 1 << 6;
	}
}

/// Descriptor of one registered operation.
#[derive(Clone)]
pub struct OperationEntry {
	name: Arc<str>,
	handler: SharedHandler,
	entry_type: EntryType,
	inherited: bool,
	flags: OperationFlags,
	description: Option<Arc<str>>,
}

impl OperationEntry {
	/// A public, non-inherited operation without flags.
	pub fn new(name: &str, handler: SharedHandler) -> Result<Self, RegistryError> {
		if name.is_empty() {
			return Err(RegistryError::IllegalArgument("operation name must not be empty".into()));
		}
		Ok(Self {
			name: Arc::from(name),
			handler,
			entry_type: EntryType::Public,
			inherited: false,
			flags: OperationFlags::empty(),
			description: None,
		})
	}

	/// Makes the operation visible on descendants that do not register their own.
	pub fn inherited(mut self) -> Self {
		self.inherited = true;
		self
	}

	pub fn private(mut self) -> Self {
		self.entry_type = EntryType::Private;
		self
	}

	pub fn with_flags(mut self, flags: OperationFlags) -> Self {
		self.flags |= flags;
		self
	}

	pub fn with_description(mut self, description: &str) -> Self {
		self.description = Some(Arc::from(description));
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn shared_name(&self) -> Arc<str> {
		self.name.clone()
	}

	pub fn handler(&self) -> &SharedHandler {
		&self.handler
	}

	pub fn entry_type(&self) -> EntryType {
		self.entry_type
	}

	pub fn is_inherited(&self) -> bool {
		self.inherited
	}

	pub fn flags(&self) -> OperationFlags {
		self.flags
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}
}

impl fmt::Debug for OperationEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OperationEntry")
			.field("name", &self.name)
			.field("entry_type", &self.entry_type)
			.field("inherited", &self.inherited)
			.field("flags", &self.flags)
			.finish_non_exhaustive()
	}
}
