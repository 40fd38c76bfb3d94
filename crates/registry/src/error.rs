//! Registry error vocabulary.
//!
//! Validation failures are synchronous and local: the call that violates an
//! invariant fails before anything is published. A missing resource during
//! resolution is not an error at all (see [`crate::Resolution::NotFound`]); the
//! [`RegistryError::NotFound`] variant is reserved for lookups whose caller
//! demanded a descriptor that does not exist.

use std::fmt;

use keel_address::{AddressError, PathAddress};

use crate::access::Permission;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	PermissionDenied,
	DuplicateRegistration,
	NotFound,
	IllegalState,
	IllegalArgument,
	Removed,
}

/// The kind of thing a registration or lookup was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Registered {
	Resource,
	Attribute,
	Operation,
	ChildType,
	Override,
	Alias,
	Proxy,
	Extension,
	Subsystem,
}

impl fmt::Display for Registered {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Resource => "resource",
			Self::Attribute => "attribute",
			Self::Operation => "operation",
			Self::ChildType => "child type",
			Self::Override => "override model",
			Self::Alias => "alias",
			Self::Proxy => "proxy controller",
			Self::Extension => "extension",
			Self::Subsystem => "subsystem",
		})
	}
}

/// Why a structurally disallowed operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IllegalStateReason {
	OverrideOnRoot,
	OverrideOnNonWildcard,
	OverrideOnOverride,
	OverrideOnRemote,
	OverrideOnAlias,
	OverrideOnRuntimeOnly,
	BeneathProxy,
	BeneathAlias,
	PersistedBeneathRuntimeOnly,
	HasChildren,
	AlreadyProxy,
	AlreadyAlias,
}

impl fmt::Display for IllegalStateReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::OverrideOnRoot => "the root registration cannot be overridden",
			Self::OverrideOnNonWildcard => "only wildcard registrations accept override models",
			Self::OverrideOnOverride => "an override model cannot itself be overridden",
			Self::OverrideOnRemote => "a proxied registration cannot be overridden",
			Self::OverrideOnAlias => "an alias registration cannot be overridden",
			Self::OverrideOnRuntimeOnly => "a runtime-only registration cannot be overridden",
			Self::BeneathProxy => "nothing can be registered beneath a proxy controller",
			Self::BeneathAlias => "nothing can be registered beneath an alias",
			Self::PersistedBeneathRuntimeOnly => "a runtime-only subtree cannot carry persisted children",
			Self::HasChildren => "the registration already has children",
			Self::AlreadyProxy => "the registration is already proxied",
			Self::AlreadyAlias => "the registration is already an alias",
		})
	}
}

/// Registry failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
	/// The caller lacks the permission the entry point requires.
	#[error("caller '{caller}' lacks the {required} permission")]
	PermissionDenied { caller: String, required: Permission },

	/// Something with the same name already exists at the target.
	#[error("{what} '{name}' is already registered at {address}")]
	DuplicateRegistration {
		address: PathAddress,
		what: Registered,
		name: String,
	},

	/// A demanded descriptor is not registered.
	#[error("{what} '{name}' is not registered at {address}")]
	NotFound {
		address: PathAddress,
		what: Registered,
		name: String,
	},

	/// Structurally disallowed operation.
	#[error("illegal state at {address}: {reason}")]
	IllegalState {
		address: PathAddress,
		reason: IllegalStateReason,
	},

	/// Malformed input or removal of something absent.
	#[error("illegal argument: {0}")]
	IllegalArgument(String),

	/// The registration was removed while the call was in flight.
	#[error("registration at {address} has been removed")]
	Removed { address: PathAddress },

	#[error("invalid address: {0}")]
	Address(#[from] AddressError),
}

impl RegistryError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
			Self::DuplicateRegistration { .. } => ErrorKind::DuplicateRegistration,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::IllegalState { .. } => ErrorKind::IllegalState,
			Self::IllegalArgument(_) | Self::Address(_) => ErrorKind::IllegalArgument,
			Self::Removed { .. } => ErrorKind::Removed,
		}
	}

	pub(crate) fn duplicate(address: &PathAddress, what: Registered, name: impl Into<String>) -> Self {
		Self::DuplicateRegistration {
			address: address.clone(),
			what,
			name: name.into(),
		}
	}

	pub(crate) fn not_found(address: &PathAddress, what: Registered, name: impl Into<String>) -> Self {
		Self::NotFound {
			address: address.clone(),
			what,
			name: name.into(),
		}
	}

	pub(crate) fn illegal_state(address: &PathAddress, reason: IllegalStateReason) -> Self {
		Self::IllegalState {
			address: address.clone(),
			reason,
		}
	}

	pub(crate) fn absent(address: &PathAddress, what: Registered, name: impl fmt::Display) -> Self {
		Self::IllegalArgument(format!("no {what} '{name}' is registered at {address}"))
	}
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
