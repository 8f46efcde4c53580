//! The descriptor model: one immutable [`TypeDescriptor`] per resolved type.
//!
//! A descriptor records how a type is taken apart and put back together. Composite descriptors
//! list their [`Component`]s in constructor parameter order, which is the canonical order of
//! both flat representations. Atomic descriptors have no components and convert through their
//! [`AtomicBridge`].
//!
//! Descriptors are built by the pipeline compiler, published once by a
//! [`ShapeContext`](crate::ShapeContext), and shared as `Arc<TypeDescriptor>` afterwards.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::bridge::AtomicBridge;
use crate::error::{Result, ShapeError};
use crate::meta::{AccessorFn, ConstructorInfo, Object, Projection, TypeRef};
use crate::value::Value;

/// Compiled decompose pipeline: instance → values in canonical order.
pub type Decompose = Arc<dyn Fn(&dyn Any) -> Result<Vec<Value>> + Send + Sync>;

/// Compiled compose pipeline: values in canonical order → instance.
pub type Compose = Arc<dyn Fn(Vec<Value>) -> Result<Object> + Send + Sync>;

/// How a descriptor was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    /// Registered bridge; no components.
    Atomic,
    /// Projects itself onto a carrier, which is inferred.
    SelfDescribing,
    /// Inferred from the constructor and accessors of the type itself.
    Inferred,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Atomic => "atomic",
            Self::SelfDescribing => "self-describing",
            Self::Inferred => "inferred",
        };
        f.write_str(label)
    }
}

/// One constructor parameter / field / accessor triple of a composite type.
#[derive(Clone)]
pub struct Component {
    pub(crate) name: &'static str,
    pub(crate) position: usize,
    pub(crate) value_type: TypeRef,
    pub(crate) descriptor: Arc<TypeDescriptor>,
    pub(crate) accessor_name: &'static str,
    pub(crate) accessor: AccessorFn,
}

impl Component {
    /// The field identifier.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Index of the component in the canonical order.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Declared type of the constructor parameter.
    pub fn value_type(&self) -> TypeRef {
        self.value_type
    }

    /// Descriptor of [`Component::value_type`].
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Always `false`: inference never produces optional components.
    pub fn is_optional(&self) -> bool {
        false
    }

    /// Name of the accessor method reading the component.
    pub fn accessor_name(&self) -> &'static str {
        self.accessor_name
    }

    /// Reads the component from a carrier instance.
    pub fn read(&self, carrier: &dyn Any) -> Result<Object> {
        (self.accessor)(carrier)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("value_type", &self.value_type)
            .field("classification", &self.descriptor.classification)
            .field("accessor", &self.accessor_name)
            .finish()
    }
}

/// The resolved shape of one type and its compiled pipelines.
pub struct TypeDescriptor {
    pub(crate) subject: TypeRef,
    pub(crate) carrier: TypeRef,
    pub(crate) classification: Classification,
    pub(crate) components: Vec<Component>,
    pub(crate) bridge: Option<AtomicBridge>,
    pub(crate) constructor: Option<&'static ConstructorInfo>,
    pub(crate) projection: Option<Projection>,
    pub(crate) decompose: Decompose,
    pub(crate) compose: Compose,
}

impl TypeDescriptor {
    /// The logical type described.
    pub fn subject(&self) -> TypeRef {
        self.subject
    }

    /// The type actually constructed and decomposed. Equals the subject unless self-describing.
    pub fn carrier(&self) -> TypeRef {
        self.carrier
    }

    /// How the descriptor was obtained.
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// `true` for bridged types without components.
    pub fn is_atomic(&self) -> bool {
        self.classification == Classification::Atomic
    }

    /// `true` for types projecting onto a carrier.
    pub fn is_self_describing(&self) -> bool {
        self.classification == Classification::SelfDescribing
    }

    /// Components in canonical order. Empty iff atomic.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Looks a component up by field name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// The bridge of an atomic descriptor.
    pub fn bridge(&self) -> Option<&AtomicBridge> {
        self.bridge.as_ref()
    }

    /// Name of the carrier constructor, for composites.
    pub fn constructor_name(&self) -> Option<&'static str> {
        self.constructor.map(|c| c.name)
    }

    /// Decomposes an instance of the subject into its values in canonical order.
    ///
    /// Atomic descriptors produce a single raw value.
    pub fn decompose(&self, subject: &dyn Any) -> Result<Vec<Value>> {
        (self.decompose)(subject)
    }

    /// Composes an instance of the subject from its values in canonical order.
    pub fn compose(&self, values: Vec<Value>) -> Result<Object> {
        (self.compose)(values)
    }

    /// Converts an instance to the single [`Value`] standing for it inside an enclosing
    /// array form: the raw value for atomic types, a [`Value::Seq`] otherwise.
    pub fn to_value(&self, subject: &dyn Any) -> Result<Value> {
        match &self.bridge {
            Some(bridge) => bridge.to_data(subject),
            None => self.decompose(subject).map(Value::Seq),
        }
    }

    /// Inverse of [`TypeDescriptor::to_value`].
    pub fn from_value(&self, value: Value) -> Result<Object> {
        match (&self.bridge, value) {
            (Some(bridge), value) => bridge.to_object(value),
            (None, Value::Seq(values)) => self.compose(values),
            (None, other) => Err(ShapeError::conversion(
                self.subject.name(),
                format!("expected sequence, found {}", other.kind_name()),
            )),
        }
    }

    /// Invokes the carrier constructor with one object per component, then converts the
    /// carrier to the subject.
    pub fn construct(&self, args: Vec<Object>) -> Result<Object> {
        let constructor = self.constructor.ok_or_else(|| {
            ShapeError::conversion(self.subject.name(), "atomic types have no constructor")
        })?;
        let carrier = (constructor.invoke)(args)?;
        match &self.projection {
            Some(projection) => (projection.from_carrier)(carrier),
            None => Ok(carrier),
        }
    }

    /// Projects a subject instance onto its carrier. `None` unless self-describing.
    pub fn to_carrier(&self, subject: &dyn Any) -> Option<Result<Object>> {
        self.projection
            .as_ref()
            .map(|projection| (projection.to_carrier)(subject))
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("subject", &self.subject)
            .field("carrier", &self.carrier)
            .field("classification", &self.classification)
            .field("components", &self.components)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}
