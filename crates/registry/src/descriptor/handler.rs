use std::sync::Arc;

use keel_address::PathAddress;
use serde_json::Value;

/// Failure raised by an attribute or operation handler.
///
/// Opaque to the registry: the dispatcher hands it back to the requester unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
	message: String,
}

impl HandlerError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

/// What a handler is being invoked for.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
	/// The address the request targeted (concrete, even when a wildcard registration served it).
	pub address: &'a PathAddress,
	pub operation: &'a str,
	pub params: &'a Value,
	/// Name of the override model applied at the target, if any.
	pub override_name: Option<&'a str>,
}

/// Executes an attribute read/write or an operation.
pub trait OperationHandler: Send + Sync {
	fn execute(&self, context: &OperationContext<'_>) -> Result<Value, HandlerError>;
}

pub type SharedHandler = Arc<dyn OperationHandler>;

struct FnHandler<F>(F);

impl<F> OperationHandler for FnHandler<F>
where
	F: Fn(&OperationContext<'_>) -> Result<Value, HandlerError> + Send + Sync,
{
	fn execute(&self, context: &OperationContext<'_>) -> Result<Value, HandlerError> {
		(self.0)(context)
	}
}

/// Wraps a closure as a [`SharedHandler`].
pub fn handler<F>(f: F) -> SharedHandler
where
	F: Fn(&OperationContext<'_>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
	Arc::new(FnHandler(f))
}
