//! Caller permissions.
//!
//! Every mutating entry point requires [`Permission::Access`]; resolution and
//! introspection require [`Permission::Read`]. The check is always the first thing
//! an entry point does, so a denied call never observes or touches registry state.

use std::fmt;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::error::RegistryError;

/// A single right a caller may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
	/// Resolve addresses and read descriptors.
	Read,
	/// Mutate the registration tree.
	Access,
}

bitflags::bitflags! {
	/// A set of caller permissions.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct PermissionSet: u8 {
		/// Resolve addresses and read descriptors.
		const READ = 1 << 0;
		/// Mutate the registration tree.
		const ACCESS = 1 << 1;
	}
}

impl Permission {
	/// Returns the bitflag for this permission.
	pub const fn as_set(self) -> PermissionSet {
		match self {
			Self::Read => PermissionSet::READ,
			Self::Access => PermissionSet::ACCESS,
		}
	}
}

impl fmt::Display for Permission {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Read => f.write_str("read"),
			Self::Access => f.write_str("access"),
		}
	}
}

impl From<Permission> for PermissionSet {
	fn from(permission: Permission) -> Self {
		permission.as_set()
	}
}

impl FromIterator<Permission> for PermissionSet {
	fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
		let mut set = PermissionSet::empty();
		for permission in iter {
			set |= permission.as_set();
		}
		set
	}
}

/// Identity plus permissions of whoever is calling into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
	name: Arc<str>,
	permissions: PermissionSet,
}

impl Caller {
	pub fn new(name: impl AsRef<str>, permissions: impl Into<PermissionSet>) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			permissions: permissions.into(),
		}
	}

	/// A caller holding every permission (boot code, lifecycle handlers).
	pub fn privileged(name: impl AsRef<str>) -> Self {
		Self::new(name, PermissionSet::all())
	}

	/// A caller that may resolve and describe but not mutate.
	pub fn reader(name: impl AsRef<str>) -> Self {
		Self::new(name, PermissionSet::READ)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn permissions(&self) -> PermissionSet {
		self.permissions
	}

	pub fn holds(&self, permission: Permission) -> bool {
		self.permissions.contains(permission.as_set())
	}
}

/// Fails with [`RegistryError::PermissionDenied`] unless `caller` holds `required`
/// or access enforcement is switched off.
pub(crate) fn require(config: &RegistryConfig, caller: &Caller, required: Permission) -> Result<(), RegistryError> {
	if !config.enforce_access || caller.holds(required) {
		return Ok(());
	}
	tracing::warn!(caller = caller.name(), %required, "registry permission denied");
	Err(RegistryError::PermissionDenied {
		caller: caller.name().to_string(),
		required,
	})
}
