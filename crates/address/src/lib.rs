//! Addresses of management resources.
//!
//! A resource is named by a [`PathAddress`]: the ordered [`PathElement`]s leading
//! from the root of the management tree to it. Each element is a `key=value` pair;
//! the value may be the wildcard `*`, which stands for every instance of that key.
//!
//! Addresses print and parse in CLI form:
//!
//! ```
//! use keel_address::PathAddress;
//!
//! let address: PathAddress = "/subsystem=logging/logger=*".parse().unwrap();
//! assert_eq!(address.len(), 2);
//! assert!(address.is_multi_target());
//! assert_eq!(address.to_string(), "/subsystem=logging/logger=*");
//! ```

mod address;
mod element;
mod error;

pub use address::PathAddress;
pub use element::PathElement;
pub use error::AddressError;

#[cfg(test)]
mod tests;
