//! Attribute and operation descriptors.
//!
//! Descriptors are immutable once built and shared between node snapshots by `Arc`,
//! so publishing a new node state never copies handler objects.

mod attribute;
mod handler;
mod operation;

pub use attribute::{AccessType, AttributeAccess, AttributeFlags, Storage};
pub use handler::{HandlerError, OperationContext, OperationHandler, SharedHandler, handler};
pub use operation::{EntryType, OperationEntry, OperationFlags};

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn noop() -> SharedHandler {
		handler(|_| Ok(json!(null)))
	}

	#[test]
	fn test_metric_is_runtime_storage_without_write_handler() {
		let metric = AttributeAccess::metric("active-count", noop(), AttributeFlags::empty()).unwrap();
		assert_eq!(metric.access_type(), AccessType::Metric);
		assert_eq!(metric.storage(), Storage::Runtime);
		assert!(metric.write_handler().is_none());
		assert!(metric.read_handler().is_some());
		assert!(!metric.is_writable());
	}

	#[test]
	fn test_storage_follows_runtime_flag() {
		let config = AttributeAccess::read_write("level", None, noop(), AttributeFlags::empty()).unwrap();
		assert_eq!(config.storage(), Storage::Configuration);
		assert!(config.write_handler().is_some());

		let runtime = AttributeAccess::read_only("uptime", None, AttributeFlags::STORAGE_RUNTIME).unwrap();
		assert_eq!(runtime.storage(), Storage::Runtime);
	}

	#[test]
	fn test_empty_names_rejected() {
		assert!(AttributeAccess::read_only("", None, AttributeFlags::empty()).is_err());
		assert!(OperationEntry::new("", noop()).is_err());
	}

	#[test]
	fn test_operation_builder() {
		let entry = OperationEntry::new("reload", noop())
			.unwrap()
			.inherited()
			.private()
			.with_flags(OperationFlags::RUNTIME_ONLY | OperationFlags::RESTART_NONE)
			.with_description("Reloads the resource");
		assert!(entry.is_inherited());
		assert_eq!(entry.entry_type(), EntryType::Private);
		assert!(entry.flags().contains(OperationFlags::RESTART_NONE));
		assert_eq!(entry.description(), Some("Reloads the resource"));
	}

	#[test]
	fn test_handler_errors_pass_through() {
		let failing = handler(|ctx| Err(HandlerError::new(format!("cannot {}", ctx.operation))));
		let address = keel_address::PathAddress::root();
		let params = json!({});
		let ctx = OperationContext {
			address: &address,
			operation: "explode",
			params: &params,
			override_name: None,
		};
		assert_eq!(failing.execute(&ctx).unwrap_err().message(), "cannot explode");
	}
}
