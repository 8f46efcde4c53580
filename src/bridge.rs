//! Atomic bridges: explicit conversions for types that are never inferred.
//!
//! A bridge converts an instance of its subject type to a single [`Value`] and back. Once
//! registered with a [`ShapeContext`](crate::ShapeContext) it is published as an atomic
//! [`TypeDescriptor`] with no components, and every component of that type passes through the
//! bridge instead of being decomposed.
//!
//! The crate ships bridges for:
//!
//! - primitives, `String` and `Vec<u8>` ([`AtomicBridge::identity`]), registered when a context
//!   is built;
//! - field-less enumerations deriving `ShapeEnum` ([`AtomicBridge::enumeration`]);
//! - `Vec<T>` over any resolvable `T` ([`AtomicBridge::collection`]);
//! - `Option<T>` over any resolvable `T` ([`AtomicBridge::optional`]).
//!
//! Anything else goes through a [`DataBridge`] implementation:
//!
//! ```rust
//! use std::time::Duration;
//!
//! use shapecode::{DataBridge, ShapeContext, Value};
//!
//! struct Millis;
//!
//! impl DataBridge<Duration, u64> for Millis {
//!     fn to_data(&self, value: &Duration) -> u64 {
//!         value.as_millis() as u64
//!     }
//!
//!     fn to_object(&self, data: u64) -> Result<Duration, String> {
//!         Ok(Duration::from_millis(data))
//!     }
//! }
//!
//! let context = ShapeContext::new();
//! let descriptor = context.register_atom::<Duration, u64, _>(Millis)?;
//! assert_eq!(descriptor.to_value(&Duration::from_secs(2))?, Value::U64(2000));
//! # Ok::<(), shapecode::ShapeError>(())
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::error::{Result, ShapeError};
use crate::meta::{Object, Shaped, TypeRef};
use crate::rt;
use crate::value::{FromValue, Value};

/// Converts a subject instance to its raw value.
pub type ToData = Arc<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;

/// Converts a raw value back to a subject instance.
pub type ToObject = Arc<dyn Fn(Value) -> Result<Object> + Send + Sync>;

/// A typed pair of conversions between `T` and a raw carrier `D`.
///
/// `D` is any type with a [`Value`] representation: a primitive, `String` or `Vec<u8>`.
pub trait DataBridge<T, D>: Send + Sync + 'static {
    /// Converts the instance to its raw form.
    fn to_data(&self, value: &T) -> D;

    /// Rebuilds an instance from its raw form.
    fn to_object(&self, data: D) -> std::result::Result<T, String>;
}

/// A type-erased atomic conversion registered for one subject type.
#[derive(Clone)]
pub struct AtomicBridge {
    subject: TypeRef,
    data_type: &'static str,
    to_data: ToData,
    to_object: ToObject,
}

impl AtomicBridge {
    /// Builds a bridge from raw conversion functions.
    ///
    /// Prefer the typed constructors; this one exists for bridges whose raw value is
    /// structured, such as sequences.
    pub fn new(
        subject: TypeRef,
        data_type: &'static str,
        to_data: impl Fn(&dyn Any) -> Result<Value> + Send + Sync + 'static,
        to_object: impl Fn(Value) -> Result<Object> + Send + Sync + 'static,
    ) -> Self {
        Self {
            subject,
            data_type,
            to_data: Arc::new(to_data),
            to_object: Arc::new(to_object),
        }
    }

    /// A bridge for a type that already is a raw value.
    pub fn identity<T>() -> Self
    where
        T: Shaped + Clone + Send + Into<Value> + FromValue,
    {
        let owner = type_name::<T>();
        Self::new(
            TypeRef::of::<T>(),
            owner,
            move |object| Ok(rt::receiver::<T>(object, owner)?.clone().into()),
            move |value| {
                T::from_value(value)
                    .map(rt::boxed)
                    .map_err(|other| mismatch(owner, owner, &other))
            },
        )
    }

    /// A bridge delegating to a [`DataBridge`] implementation.
    pub fn from_data<T, D, B>(bridge: B) -> Self
    where
        T: Shaped + Send,
        D: Into<Value> + FromValue + 'static,
        B: DataBridge<T, D>,
    {
        let owner = type_name::<T>();
        let data_type = type_name::<D>();
        let bridge = Arc::new(bridge);
        let reader = Arc::clone(&bridge);
        Self::new(
            TypeRef::of::<T>(),
            data_type,
            move |object| Ok(reader.to_data(rt::receiver::<T>(object, owner)?).into()),
            move |value| {
                let data = D::from_value(value).map_err(|other| mismatch(owner, data_type, &other))?;
                bridge
                    .to_object(data)
                    .map(rt::boxed)
                    .map_err(|reason| ShapeError::conversion(owner, reason))
            },
        )
    }

    /// A bridge mapping the variants of a `ShapeEnum` enumeration to their names.
    ///
    /// Fails with [`ShapeError::UnsupportedType`] if `E` carries no variant table.
    pub fn enumeration<E: Shaped>() -> Result<Self> {
        let owner = type_name::<E>();
        let info = E::shape_info();
        let Some(table) = info.enumeration else {
            return Err(ShapeError::UnsupportedType {
                type_name: owner.to_string(),
                kind: info.kind,
            });
        };

        Ok(Self::new(
            TypeRef::of::<E>(),
            type_name::<String>(),
            move |object| {
                let index = (table.index_of)(object).ok_or_else(|| {
                    ShapeError::conversion(owner, format!("object is not a {owner}"))
                })?;
                table
                    .variants
                    .get(index)
                    .map(|name| Value::String((*name).to_string()))
                    .ok_or_else(|| ShapeError::Internal(format!("{owner} has no variant {index}")))
            },
            move |value| {
                let name = match value {
                    Value::String(name) => name,
                    other => return Err(mismatch(owner, "variant name", &other)),
                };
                table
                    .variants
                    .iter()
                    .position(|variant| *variant == name)
                    .and_then(table.from_index)
                    .ok_or_else(|| {
                        ShapeError::conversion(owner, format!("unknown variant `{name}`"))
                    })
            },
        ))
    }

    /// A bridge converting `Vec<T>` to a [`Value::Seq`] of its elements.
    ///
    /// Elements go through `element`, the descriptor of `T`: atomic elements become their raw
    /// value and composite elements their array form.
    pub fn collection<T: Shaped + Send>(element: Arc<TypeDescriptor>) -> Self {
        let owner = type_name::<Vec<T>>();
        let reader = Arc::clone(&element);
        Self::new(
            TypeRef::of::<Vec<T>>(),
            type_name::<Vec<Value>>(),
            move |object| {
                let items = rt::receiver::<Vec<T>>(object, owner)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| reader.to_value(item).map_err(|e| element_error(e, owner, i)))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Seq)
            },
            move |value| {
                let items = match value {
                    Value::Seq(items) => items,
                    other => return Err(mismatch(owner, "sequence", &other)),
                };
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        element
                            .from_value(item)
                            .and_then(|object| rt::downcast::<T>(object, owner))
                            .map_err(|e| element_error(e, owner, i))
                    })
                    .collect::<Result<Vec<T>>>()
                    .map(rt::boxed)
            },
        )
    }

    /// A bridge converting `Option<T>`: `None` is [`Value::Unit`], `Some(v)` is the value of `v`.
    pub fn optional<T: Shaped + Send>(inner: Arc<TypeDescriptor>) -> Self {
        let owner = type_name::<Option<T>>();
        let reader = Arc::clone(&inner);
        Self::new(
            TypeRef::of::<Option<T>>(),
            inner.subject().name(),
            move |object| match rt::receiver::<Option<T>>(object, owner)? {
                Some(value) => reader.to_value(value),
                None => Ok(Value::Unit),
            },
            move |value| match value {
                Value::Unit => Ok(rt::boxed(None::<T>)),
                value => inner
                    .from_value(value)
                    .and_then(|object| rt::downcast::<T>(object, owner))
                    .map(|value| rt::boxed(Some(value))),
            },
        )
    }

    /// The subject type of the bridge.
    pub fn subject(&self) -> TypeRef {
        self.subject
    }

    /// Name of the raw carrier type.
    pub fn data_type(&self) -> &'static str {
        self.data_type
    }

    /// Converts a subject instance to its raw value.
    pub fn to_data(&self, object: &dyn Any) -> Result<Value> {
        (self.to_data)(object)
    }

    /// Converts a raw value to a subject instance.
    pub fn to_object(&self, value: Value) -> Result<Object> {
        (self.to_object)(value)
    }
}

impl fmt::Debug for AtomicBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBridge")
            .field("subject", &self.subject)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// Identity bridges published by a context built with `register_primitives`.
pub(crate) fn primitives() -> Vec<AtomicBridge> {
    vec![
        AtomicBridge::identity::<()>(),
        AtomicBridge::identity::<bool>(),
        AtomicBridge::identity::<char>(),
        AtomicBridge::identity::<i8>(),
        AtomicBridge::identity::<i16>(),
        AtomicBridge::identity::<i32>(),
        AtomicBridge::identity::<i64>(),
        AtomicBridge::identity::<u8>(),
        AtomicBridge::identity::<u16>(),
        AtomicBridge::identity::<u32>(),
        AtomicBridge::identity::<u64>(),
        AtomicBridge::identity::<f32>(),
        AtomicBridge::identity::<f64>(),
        AtomicBridge::identity::<String>(),
        AtomicBridge::identity::<Vec<u8>>(),
    ]
}

fn mismatch(owner: &str, expected: &str, found: &Value) -> ShapeError {
    ShapeError::conversion(
        owner,
        format!("expected {expected}, found {}", found.kind_name()),
    )
}

fn element_error(err: ShapeError, owner: &str, index: usize) -> ShapeError {
    match err {
        ShapeError::Conversion { .. } => {
            ShapeError::conversion(owner, format!("element {index}: {err}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trip() -> Result<()> {
        let bridge = AtomicBridge::identity::<i64>();
        let value = bridge.to_data(&42_i64)?;
        assert_eq!(value, Value::I64(42));
        let object = bridge.to_object(value)?;
        assert_eq!(rt::downcast::<i64>(object, "i64")?, 42);
        Ok(())
    }

    #[test]
    fn identity_rejects_other_values() {
        let bridge = AtomicBridge::identity::<i64>();
        let err = bridge.to_object(Value::String("x".into())).unwrap_err();
        assert!(err.to_string().contains("found string"), "{err}");
        assert!(bridge.to_data(&1_i32).is_err());
    }

    struct Millis;

    impl DataBridge<std::time::Duration, u64> for Millis {
        fn to_data(&self, value: &std::time::Duration) -> u64 {
            value.as_millis() as u64
        }

        fn to_object(&self, data: u64) -> std::result::Result<std::time::Duration, String> {
            if data == u64::MAX {
                return Err("duration overflow".into());
            }
            Ok(std::time::Duration::from_millis(data))
        }
    }

    #[test]
    fn data_bridges_convert_and_report_failures() -> Result<()> {
        let bridge = AtomicBridge::from_data::<std::time::Duration, u64, _>(Millis);
        assert_eq!(bridge.data_type(), "u64");

        let value = bridge.to_data(&std::time::Duration::from_millis(1500))?;
        assert_eq!(value, Value::U64(1500));

        let err = bridge.to_object(Value::U64(u64::MAX)).unwrap_err();
        assert!(err.to_string().contains("duration overflow"), "{err}");
        Ok(())
    }
}
