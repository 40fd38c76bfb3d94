use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::AddressError;

/// One `(key, value)` segment of a [`crate::PathAddress`].
///
/// The value is either a concrete identifier or the reserved wildcard
/// [`PathElement::WILDCARD_VALUE`]. Both parts are reference counted so cloning
/// an element (and therefore an address) never copies string data.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathElement {
	key: Arc<str>,
	value: Arc<str>,
}

impl PathElement {
	/// Value standing for "every instance of this key".
	pub const WILDCARD_VALUE: &'static str = "*";

	/// Builds an element, validating both parts.
	///
	/// Passing [`Self::WILDCARD_VALUE`] as the value yields the wildcard element for `key`.
	pub fn new(key: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, AddressError> {
		let key = key.as_ref();
		let value = value.as_ref();
		validate_key(key)?;
		validate_value(key, value)?;
		Ok(Self {
			key: Arc::from(key),
			value: Arc::from(value),
		})
	}

	/// Builds the wildcard element for `key`.
	pub fn wildcard(key: impl AsRef<str>) -> Result<Self, AddressError> {
		Self::new(key, Self::WILDCARD_VALUE)
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	/// Returns true if the value is the wildcard marker.
	pub fn is_wildcard(&self) -> bool {
		&*self.value == Self::WILDCARD_VALUE
	}

	/// Returns true if `other` is addressed by this element: either the two are
	/// equal, or this element is the wildcard for `other`'s key.
	pub fn matches(&self, other: &PathElement) -> bool {
		self.key == other.key && (self.is_wildcard() || self.value == other.value)
	}

	/// Returns this element's key paired with `other`'s value.
	pub fn with_value_of(&self, other: &PathElement) -> Self {
		Self {
			key: self.key.clone(),
			value: other.value.clone(),
		}
	}

	/// Returns a copy of this element with the value replaced.
	pub fn with_value(&self, value: impl AsRef<str>) -> Result<Self, AddressError> {
		let value = value.as_ref();
		validate_value(&self.key, value)?;
		Ok(Self {
			key: self.key.clone(),
			value: Arc::from(value),
		})
	}
}

fn validate_key(key: &str) -> Result<(), AddressError> {
	if key.is_empty() {
		return Err(AddressError::EmptyKey);
	}
	if let Some(ch) = key.chars().find(|c| matches!(c, '=' | '/')) {
		return Err(AddressError::IllegalCharacter {
			part: "key",
			text: key.to_string(),
			ch,
		});
	}
	Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), AddressError> {
	if value.is_empty() {
		return Err(AddressError::EmptyValue { key: key.to_string() });
	}
	if value.contains('/') {
		return Err(AddressError::IllegalCharacter {
			part: "value",
			text: value.to_string(),
			ch: '/',
		});
	}
	Ok(())
}

impl fmt::Display for PathElement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.key, self.value)
	}
}

impl fmt::Debug for PathElement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PathElement({self})")
	}
}

impl FromStr for PathElement {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (key, value) = s
			.split_once('=')
			.ok_or_else(|| AddressError::MalformedSegment(s.to_string()))?;
		Self::new(key, value)
	}
}

impl Serialize for PathElement {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for PathElement {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let text = String::deserialize(deserializer)?;
		text.parse().map_err(serde::de::Error::custom)
	}
}
