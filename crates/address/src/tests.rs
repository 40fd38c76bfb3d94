use proptest::prelude::*;
use rstest::rstest;

use crate::{AddressError, PathAddress, PathElement};

fn element(key: &str, value: &str) -> PathElement {
	PathElement::new(key, value).expect("valid element")
}

#[test]
fn test_wildcard_value_builds_wildcard_element() {
	let w = PathElement::new("subsystem", "*").unwrap();
	assert!(w.is_wildcard());
	assert_eq!(w, PathElement::wildcard("subsystem").unwrap());
	assert!(!element("subsystem", "logging").is_wildcard());
}

#[test]
fn test_wildcard_matches_same_key_only() {
	let w = PathElement::wildcard("subsystem").unwrap();
	assert!(w.matches(&element("subsystem", "logging")));
	assert!(!w.matches(&element("host", "logging")));
	assert!(!element("subsystem", "mail").matches(&element("subsystem", "logging")));
	assert!(element("subsystem", "mail").matches(&element("subsystem", "mail")));
}

#[rstest]
#[case("", "x", AddressError::EmptyKey)]
#[case("subsystem", "", AddressError::EmptyValue { key: "subsystem".into() })]
#[case("sub=system", "x", AddressError::IllegalCharacter { part: "key", text: "sub=system".into(), ch: '=' })]
#[case("sub/system", "x", AddressError::IllegalCharacter { part: "key", text: "sub/system".into(), ch: '/' })]
#[case("subsystem", "a/b", AddressError::IllegalCharacter { part: "value", text: "a/b".into(), ch: '/' })]
fn test_invalid_elements_rejected(#[case] key: &str, #[case] value: &str, #[case] expected: AddressError) {
	assert_eq!(PathElement::new(key, value), Err(expected));
}

#[rstest]
#[case("")]
#[case("/")]
fn test_root_parses(#[case] text: &str) {
	let address: PathAddress = text.parse().unwrap();
	assert!(address.is_root());
	assert_eq!(address.to_string(), "/");
}

#[rstest]
#[case("/subsystem")]
#[case("/subsystem=logging//logger=x")]
#[case("/subsystem=logging/")]
fn test_malformed_addresses_rejected(#[case] text: &str) {
	assert!(text.parse::<PathAddress>().is_err());
}

#[test]
fn test_leading_slash_is_optional() {
	let a: PathAddress = "subsystem=logging/logger=root".parse().unwrap();
	let b: PathAddress = "/subsystem=logging/logger=root".parse().unwrap();
	assert_eq!(a, b);
}

#[test]
fn test_prefix_suffix_and_parent() {
	let address: PathAddress = "/host=remote1/server=main/subsystem=web".parse().unwrap();
	assert_eq!(address.prefix(1).to_string(), "/host=remote1");
	assert_eq!(address.suffix(1).to_string(), "/server=main/subsystem=web");
	assert_eq!(address.parent().to_string(), "/host=remote1/server=main");
	assert_eq!(address.suffix(10), PathAddress::root());
	assert_eq!(PathAddress::root().parent(), PathAddress::root());
	assert!(address.starts_with(&address.prefix(2)));
	assert!(!address.prefix(2).starts_with(&address));
	assert_eq!(address.prefix(1).join(&address.suffix(1)), address);
}

#[test]
fn test_structural_equality() {
	let a = PathAddress::root()
		.append(element("subsystem", "logging"))
		.append(element("logger", "root"));
	let b: PathAddress = "/subsystem=logging/logger=root".parse().unwrap();
	let c: PathAddress = "/logger=root/subsystem=logging".parse().unwrap();
	assert_eq!(a, b);
	assert_ne!(a, c);
}

#[test]
fn test_serde_uses_display_form() {
	let address: PathAddress = "/subsystem=logging/logger=*".parse().unwrap();
	let json = serde_json::to_string(&address).unwrap();
	assert_eq!(json, "\"/subsystem=logging/logger=*\"");
	let back: PathAddress = serde_json::from_str(&json).unwrap();
	assert_eq!(back, address);
}

fn arb_element() -> impl Strategy<Value = PathElement> {
	("[a-z][a-z-]{0,8}", prop_oneof![Just("*".to_string()), "[a-zA-Z0-9.=_-]{1,8}"])
		.prop_map(|(key, value)| PathElement::new(key, value).expect("generated element is valid"))
}

proptest! {
	/// The CLI form identifies an address uniquely.
	#[test]
	fn prop_display_parse_identity(elements in proptest::collection::vec(arb_element(), 0..6)) {
		let address = PathAddress::from_elements(elements);
		let parsed: PathAddress = address.to_string().parse().expect("display form parses");
		prop_assert_eq!(parsed, address);
	}
}
