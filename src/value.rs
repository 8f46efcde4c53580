//! The element type of both flat representations.
//!
//! A decomposed record is a `Vec<Value>` in canonical component order (array form) or a
//! [`ValueMap`] keyed by component name (map form). Atomic components appear as scalar
//! variants; nested composites appear as [`Value::Seq`] in array form and [`Value::Map`] in map
//! form.
//!
//! `Value` implements serde's `Serialize` and `Deserialize`, so any serde format can encode the
//! flat representations. Encoding itself is left to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Map form of a record: component name → value.
pub type ValueMap = BTreeMap<String, Value>;

/// A raw component value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The unit value, also used for `None`.
    Unit,
    /// A boolean.
    Bool(bool),
    /// An 8-bit signed integer.
    I8(i8),
    /// A 16-bit signed integer.
    I16(i16),
    /// A 32-bit signed integer.
    I32(i32),
    /// A 64-bit signed integer.
    I64(i64),
    /// An 8-bit unsigned integer.
    U8(u8),
    /// A 16-bit unsigned integer.
    U16(u16),
    /// A 32-bit unsigned integer.
    U32(u32),
    /// A 64-bit unsigned integer.
    U64(u64),
    /// A 32-bit float.
    F32(f32),
    /// A 64-bit float.
    F64(f64),
    /// A character.
    Char(char),
    /// A string.
    String(String),
    /// A byte buffer.
    Bytes(Vec<u8>),
    /// Array form of a nested composite, or the elements of a collection.
    Seq(Vec<Value>),
    /// Map form of a nested composite.
    Map(ValueMap),
}

impl Value {
    /// A short name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Char(_) => "char",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
        }
    }

    /// Returns the elements if this is a [`Value::Seq`].
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the entries if this is a [`Value::Map`].
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Conversion out of a [`Value`]. The rejected value is handed back on mismatch.
pub trait FromValue: Sized {
    /// Extracts `Self` from `value`.
    fn from_value(value: Value) -> std::result::Result<Self, Value>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        Ok(value)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Unit => Ok(()),
            other => Err(other),
        }
    }
}

macro_rules! impl_value_scalar {
    ($($variant:ident => $t:ty),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v)
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> std::result::Result<Self, Value> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    }
}

impl_value_scalar!(
    Bool => bool,
    I8 => i8,
    I16 => i16,
    I32 => i32,
    I64 => i64,
    U8 => u8,
    U16 => u16,
    U32 => u32,
    U64 => u64,
    F32 => f32,
    F64 => f64,
    Char => char,
    String => String,
    Bytes => Vec<u8>,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions_reject_other_variants() {
        assert_eq!(i32::from_value(Value::I32(7)), Ok(7));
        assert_eq!(i32::from_value(Value::I64(7)), Err(Value::I64(7)));
        assert_eq!(String::from_value(Value::from("a")), Ok("a".to_string()));
        assert_eq!(<()>::from_value(Value::Unit), Ok(()));
    }

    #[test]
    fn accessors() {
        let seq = Value::Seq(vec![Value::I32(1)]);
        assert_eq!(seq.as_seq(), Some(&[Value::I32(1)][..]));
        assert!(seq.as_map().is_none());
        assert_eq!(seq.kind_name(), "sequence");
    }
}
