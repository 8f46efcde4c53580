//! Array and map mappers: typed entry points over the compiled pipelines.
//!
//! Both mappers resolve the top-level type once per call and hand the instance to its
//! descriptor. Nested composites are handled by the descriptor graph, never by a new lookup.
//!
//! ```rust
//! use shapecode::{ArrayMapper, MapMapper, ShapeContext, Value, shape};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! pub struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! #[shape]
//! impl Point {
//!     pub fn new(x: i32, y: i32) -> Self {
//!         Self { x, y }
//!     }
//!
//!     pub fn x(&self) -> i32 {
//!         self.x
//!     }
//!
//!     pub fn y(&self) -> i32 {
//!         self.y
//!     }
//! }
//!
//! let context = ShapeContext::new();
//!
//! let array = ArrayMapper::new(&context);
//! let values = array.decompose(&Point::new(1, 2))?;
//! assert_eq!(values, vec![Value::I32(1), Value::I32(2)]);
//! assert_eq!(array.compose::<Point>(values)?, Point::new(1, 2));
//!
//! let map = MapMapper::new(&context);
//! let entries = map.to_map(&Point::new(1, 2))?;
//! assert_eq!(entries["y"], Value::I32(2));
//! assert_eq!(map.from_map::<Point>(&entries)?, Point::new(1, 2));
//! # Ok::<(), shapecode::ShapeError>(())
//! ```

use std::any::Any;

use crate::context::ShapeContext;
use crate::descriptor::TypeDescriptor;
use crate::error::{Result, ShapeError};
use crate::meta::{Object, Shaped};
use crate::rt;
use crate::value::{Value, ValueMap};

/// Converts instances to and from their array form.
#[derive(Debug, Clone, Copy)]
pub struct ArrayMapper<'c> {
    context: &'c ShapeContext,
}

impl<'c> ArrayMapper<'c> {
    /// Creates a mapper resolving types through `context`.
    pub fn new(context: &'c ShapeContext) -> Self {
        Self { context }
    }

    /// Decomposes `value` into its component values in canonical order.
    pub fn decompose<T: Shaped>(&self, value: &T) -> Result<Vec<Value>> {
        self.context.resolve::<T>()?.decompose(value)
    }

    /// Composes a `T` from its component values in canonical order.
    pub fn compose<T: Shaped>(&self, values: Vec<Value>) -> Result<T> {
        let descriptor = self.context.resolve::<T>()?;
        let object = descriptor.compose(values)?;
        rt::downcast::<T>(object, descriptor.subject().name())
    }
}

/// Converts instances to and from their map form.
///
/// The map form keys each component by its field name. Atomic components hold their raw value;
/// nested composites hold their own map form as [`Value::Map`].
#[derive(Debug, Clone, Copy)]
pub struct MapMapper<'c> {
    context: &'c ShapeContext,
}

impl<'c> MapMapper<'c> {
    /// Creates a mapper resolving types through `context`.
    pub fn new(context: &'c ShapeContext) -> Self {
        Self { context }
    }

    /// Converts `value` to its map form.
    pub fn to_map<T: Shaped>(&self, value: &T) -> Result<ValueMap> {
        let descriptor = self.context.resolve::<T>()?;
        to_map(&descriptor, value)
    }

    /// Composes a `T` from its map form. Every component must be present.
    pub fn from_map<T: Shaped>(&self, map: &ValueMap) -> Result<T> {
        let descriptor = self.context.resolve::<T>()?;
        let object = from_map(&descriptor, map)?;
        rt::downcast::<T>(object, descriptor.subject().name())
    }
}

fn require_composite(descriptor: &TypeDescriptor) -> Result<()> {
    if descriptor.is_atomic() {
        return Err(ShapeError::conversion(
            descriptor.subject().name(),
            "atomic types have no map form",
        ));
    }
    Ok(())
}

fn to_map(descriptor: &TypeDescriptor, subject: &dyn Any) -> Result<ValueMap> {
    require_composite(descriptor)?;
    let owner = descriptor.subject().name();

    let projected = descriptor.to_carrier(subject).transpose()?;
    let carrier: &dyn Any = match &projected {
        Some(carrier) => &**carrier,
        None => subject,
    };

    descriptor
        .components()
        .iter()
        .map(|component| {
            let (name, position) = (component.name(), component.position());
            let raw = component
                .read(carrier)
                .map_err(|e| e.within(owner, name, position))?;
            let nested = component.descriptor();
            let value = if nested.is_atomic() {
                nested.to_value(&*raw)
            } else {
                to_map(nested, &*raw).map(Value::Map)
            };
            value
                .map(|value| (name.to_string(), value))
                .map_err(|e| e.within(owner, name, position))
        })
        .collect()
}

fn from_map(descriptor: &TypeDescriptor, map: &ValueMap) -> Result<Object> {
    require_composite(descriptor)?;
    let owner = descriptor.subject().name();

    let args = descriptor
        .components()
        .iter()
        .map(|component| {
            let (name, position) = (component.name(), component.position());
            let value = map.get(name).ok_or_else(|| {
                ShapeError::component(owner, name, position, "missing from map")
            })?;
            let nested = component.descriptor();
            if nested.is_atomic() {
                return nested
                    .from_value(value.clone())
                    .map_err(|e| e.within(owner, name, position));
            }
            match value {
                Value::Map(entries) => {
                    from_map(nested, entries).map_err(|e| e.within(owner, name, position))
                }
                other => Err(ShapeError::component(
                    owner,
                    name,
                    position,
                    format!("expected map, found {}", other.kind_name()),
                )),
            }
        })
        .collect::<Result<Vec<Object>>>()?;

    descriptor.construct(args)
}
