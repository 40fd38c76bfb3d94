use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::{AddressError, PathElement};

/// Ordered sequence of [`PathElement`]s leading from the tree root to a resource.
///
/// The empty address is the root. Equality is structural: two addresses are equal
/// iff their elements are pairwise equal in order.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathAddress {
	elements: SmallVec<[PathElement; 4]>,
}

impl PathAddress {
	/// The root address.
	pub fn root() -> Self {
		Self::default()
	}

	pub fn from_elements(elements: impl IntoIterator<Item = PathElement>) -> Self {
		Self {
			elements: elements.into_iter().collect(),
		}
	}

	/// Returns a new address with `element` appended.
	pub fn append(&self, element: PathElement) -> Self {
		let mut elements = self.elements.clone();
		elements.push(element);
		Self { elements }
	}

	/// Returns a new address with every element of `other` appended.
	pub fn join(&self, other: &PathAddress) -> Self {
		let mut elements = self.elements.clone();
		elements.extend(other.elements.iter().cloned());
		Self { elements }
	}

	/// Address of the parent resource; the root's parent is the root.
	pub fn parent(&self) -> Self {
		self.prefix(self.len().saturating_sub(1))
	}

	pub fn last(&self) -> Option<&PathElement> {
		self.elements.last()
	}

	pub fn element(&self, index: usize) -> Option<&PathElement> {
		self.elements.get(index)
	}

	pub fn len(&self) -> usize {
		self.elements.len()
	}

	pub fn is_empty(&self) -> bool {
		self.elements.is_empty()
	}

	/// True for the root address.
	pub fn is_root(&self) -> bool {
		self.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, PathElement> {
		self.elements.iter()
	}

	pub fn as_slice(&self) -> &[PathElement] {
		&self.elements
	}

	/// The first `len` elements (clamped).
	pub fn prefix(&self, len: usize) -> Self {
		let len = len.min(self.len());
		Self::from_elements(self.elements[..len].iter().cloned())
	}

	/// Elements from `start` onwards (clamped).
	pub fn suffix(&self, start: usize) -> Self {
		let start = start.min(self.len());
		Self::from_elements(self.elements[start..].iter().cloned())
	}

	pub fn starts_with(&self, prefix: &PathAddress) -> bool {
		self.elements.starts_with(&prefix.elements)
	}

	/// True if any element is a wildcard, i.e. the address names a set of resources.
	pub fn is_multi_target(&self) -> bool {
		self.elements.iter().any(PathElement::is_wildcard)
	}
}

impl<'a> IntoIterator for &'a PathAddress {
	type Item = &'a PathElement;
	type IntoIter = std::slice::Iter<'a, PathElement>;

	fn into_iter(self) -> Self::IntoIter {
		self.elements.iter()
	}
}

impl FromIterator<PathElement> for PathAddress {
	fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
		Self::from_elements(iter)
	}
}

impl From<PathElement> for PathAddress {
	fn from(element: PathElement) -> Self {
		Self::from_elements([element])
	}
}

impl fmt::Display for PathAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.elements.is_empty() {
			return f.write_str("/");
		}
		for element in &self.elements {
			write!(f, "/{element}")?;
		}
		Ok(())
	}
}

impl fmt::Debug for PathAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PathAddress({self})")
	}
}

/// Parses the CLI form `/key=value/key=value`. The leading slash is optional and
/// both `""` and `"/"` parse to the root.
impl FromStr for PathAddress {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let body = s.strip_prefix('/').unwrap_or(s);
		if body.is_empty() {
			return Ok(Self::root());
		}
		body.split('/')
			.map(|segment| {
				if segment.is_empty() {
					Err(AddressError::MalformedSegment(s.to_string()))
				} else {
					segment.parse()
				}
			})
			.collect()
	}
}

impl Serialize for PathAddress {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for PathAddress {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let text = String::deserialize(deserializer)?;
		text.parse().map_err(serde::de::Error::custom)
	}
}
