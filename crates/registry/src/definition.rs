//! Self-registering resource definitions.
//!
//! A definition is handed a [`ResourceRegistration`] for its freshly created node and
//! populates it. The node only becomes visible to resolution once every hook has
//! returned `Ok`, so a failing hook leaves the tree untouched.

use keel_address::PathElement;

use crate::error::RegistryError;
use crate::tree::ResourceRegistration;

/// Describes a resource type and registers its attributes, operations and children.
pub trait ResourceDefinition: Send + Sync {
	/// Element this definition registers under; `None` only for root definitions.
	fn path_element(&self) -> Option<&PathElement>;

	fn description(&self) -> &str {
		""
	}

	/// Resources without a persisted configuration representation.
	fn is_runtime_only(&self) -> bool {
		false
	}

	fn register_attributes(&self, _registration: &ResourceRegistration) -> Result<(), RegistryError> {
		Ok(())
	}

	fn register_operations(&self, _registration: &ResourceRegistration) -> Result<(), RegistryError> {
		Ok(())
	}

	fn register_children(&self, _registration: &ResourceRegistration) -> Result<(), RegistryError> {
		Ok(())
	}
}

/// Runs the three registration hooks in order.
pub(crate) fn populate(definition: &dyn ResourceDefinition, registration: &ResourceRegistration) -> Result<(), RegistryError> {
	definition.register_attributes(registration)?;
	definition.register_operations(registration)?;
	definition.register_children(registration)
}

type Hook = Box<dyn Fn(&ResourceRegistration) -> Result<(), RegistryError> + Send + Sync>;

/// Closure-backed [`ResourceDefinition`].
///
/// ```
/// use keel_address::PathElement;
/// use keel_registry::{AttributeAccess, AttributeFlags, SimpleResourceDefinition};
///
/// let definition = SimpleResourceDefinition::new(PathElement::wildcard("logger").unwrap(), "A logger")
/// 	.with_attributes(|reg| {
/// 		reg.register_attribute(AttributeAccess::read_only("category", None, AttributeFlags::empty())?)
/// 	});
/// ```
pub struct SimpleResourceDefinition {
	element: Option<PathElement>,
	description: String,
	runtime_only: bool,
	attributes: Option<Hook>,
	operations: Option<Hook>,
	children: Option<Hook>,
}

impl SimpleResourceDefinition {
	pub fn new(element: PathElement, description: impl Into<String>) -> Self {
		Self {
			element: Some(element),
			..Self::root(description)
		}
	}

	/// A definition for the root registration.
	pub fn root(description: impl Into<String>) -> Self {
		Self {
			element: None,
			description: description.into(),
			runtime_only: false,
			attributes: None,
			operations: None,
			children: None,
		}
	}

	pub fn runtime_only(mut self) -> Self {
		self.runtime_only = true;
		self
	}

	pub fn with_attributes<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ResourceRegistration) -> Result<(), RegistryError> + Send + Sync + 'static,
	{
		self.attributes = Some(Box::new(hook));
		self
	}

	pub fn with_operations<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ResourceRegistration) -> Result<(), RegistryError> + Send + Sync + 'static,
	{
		self.operations = Some(Box::new(hook));
		self
	}

	pub fn with_children<F>(mut self, hook: F) -> Self
	where
		F: Fn(&ResourceRegistration) -> Result<(), RegistryError> + Send + Sync + 'static,
	{
		self.children = Some(Box::new(hook));
		self
	}
}

fn run(hook: &Option<Hook>, registration: &ResourceRegistration) -> Result<(), RegistryError> {
	match hook {
		Some(hook) => hook(registration),
		None => Ok(()),
	}
}

impl ResourceDefinition for SimpleResourceDefinition {
	fn path_element(&self) -> Option<&PathElement> {
		self.element.as_ref()
	}

	fn description(&self) -> &str {
		&self.description
	}

	fn is_runtime_only(&self) -> bool {
		self.runtime_only
	}

	fn register_attributes(&self, registration: &ResourceRegistration) -> Result<(), RegistryError> {
		run(&self.attributes, registration)
	}

	fn register_operations(&self, registration: &ResourceRegistration) -> Result<(), RegistryError> {
		run(&self.operations, registration)
	}

	fn register_children(&self, registration: &ResourceRegistration) -> Result<(), RegistryError> {
		run(&self.children, registration)
	}
}
