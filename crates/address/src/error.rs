/// Errors raised while building or parsing addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
	/// A path element was given an empty key.
	#[error("path element key must not be empty")]
	EmptyKey,

	/// A path element was given an empty value.
	#[error("path element value for key '{key}' must not be empty")]
	EmptyValue { key: String },

	/// A key or value contains a reserved separator.
	#[error("illegal character {ch:?} in {part} '{text}'")]
	IllegalCharacter { part: &'static str, text: String, ch: char },

	/// A segment could not be split into `key=value`.
	#[error("malformed address segment '{0}' (expected key=value)")]
	MalformedSegment(String),
}
