use keel_address::PathAddress;

/// Redirect attached to an alias registration.
///
/// Resolving an address that passes through the alias registration restarts
/// resolution from the root at [`AliasEntry::convert_to_target_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
	target: PathAddress,
}

impl AliasEntry {
	pub fn new(target: PathAddress) -> Self {
		Self { target }
	}

	pub fn target_address(&self) -> &PathAddress {
		&self.target
	}

	/// Maps `requested`, whose first `alias_depth` elements addressed the alias
	/// registration, onto the target.
	///
	/// The matched prefix is replaced by the target address. A wildcard in the
	/// target takes the value found at the same position of the requested address,
	/// so `/subsystem=a/alias=x` through an alias `/subsystem=a/alias=*` targeting
	/// `/subsystem=a/real=*` becomes `/subsystem=a/real=x`. Elements beyond the
	/// alias are appended unchanged.
	pub fn convert_to_target_address(&self, requested: &PathAddress, alias_depth: usize) -> PathAddress {
		let converted = self.target.iter().enumerate().map(|(i, target)| match requested.element(i) {
			Some(element) if i < alias_depth && target.is_wildcard() && !element.is_wildcard() => {
				target.with_value_of(element)
			}
			_ => target.clone(),
		});
		PathAddress::from_elements(converted).join(&requested.suffix(alias_depth))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(text: &str) -> PathAddress {
		text.parse().unwrap()
	}

	#[test]
	fn test_wildcard_value_substitution_across_types() {
		let alias = AliasEntry::new(addr("/subsystem=a/real=*"));
		let converted = alias.convert_to_target_address(&addr("/subsystem=a/alias=x/child=y"), 2);
		assert_eq!(converted, addr("/subsystem=a/real=x/child=y"));
	}

	#[test]
	fn test_concrete_target_replaces_prefix() {
		let alias = AliasEntry::new(addr("/subsystem=new-name"));
		let converted = alias.convert_to_target_address(&addr("/subsystem=old-name/handler=h"), 1);
		assert_eq!(converted, addr("/subsystem=new-name/handler=h"));
	}

	#[test]
	fn test_target_deeper_than_alias_keeps_suffix() {
		let alias = AliasEntry::new(addr("/b=2/c=3"));
		assert_eq!(alias.convert_to_target_address(&addr("/a=1/d=4"), 1), addr("/b=2/c=3/d=4"));
	}

	#[test]
	fn test_wildcard_beyond_match_is_kept() {
		let alias = AliasEntry::new(addr("/x=1/y=*"));
		assert_eq!(alias.convert_to_target_address(&addr("/a=1"), 1), addr("/x=1/y=*"));
	}
}
