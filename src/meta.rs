//! Runtime metadata describing a type to the resolution policy.
//!
//! Rust has no runtime reflection, so each type that takes part in resolution implements
//! [`Shaped`] and hands out a static [`ClassInfo`] table. For user types the table is generated
//! by `#[shape]` (records) or `#[derive(ShapeEnum)]` (enumerations); the crate implements it for
//! primitives, strings and the standard containers.
//!
//! The table holds what the resolution policy needs to know about a type: the type's
//! [`TypeKind`], its candidate constructors and `&self` methods with their lowered [`Insn`]
//! bodies, and type-erased invokers that let the compiled pipelines call them.

use std::any::{Any, TypeId};
use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::ir::Insn;

/// A type-erased, owned instance travelling between pipeline stages.
pub type Object = Box<dyn Any + Send>;

/// Invokes a constructor with one [`Object`] per parameter.
pub type ConstructorFn = fn(Vec<Object>) -> Result<Object>;

/// Invokes a zero-argument `&self` method and returns an owned copy of its result.
pub type AccessorFn = fn(&dyn Any) -> Result<Object>;

/// Implemented by every type that can be handed to a `ShapeContext`.
///
/// Do not implement this by hand for records; use `#[shape]` on the type's inherent `impl`
/// block. Hand-written impls are fine for kinds that only need a bridge, such as trait objects:
///
/// ```rust
/// use shapecode::meta::{ClassInfo, Shaped, TypeKind};
///
/// trait Drawable {}
///
/// impl Shaped for dyn Drawable {
///     fn shape_info() -> &'static ClassInfo {
///         static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Interface);
///         &INFO
///     }
/// }
/// ```
pub trait Shaped: 'static {
    /// Returns the static metadata table of the type.
    fn shape_info() -> &'static ClassInfo;
}

/// The broad category of a type. Only [`TypeKind::Record`] is ever inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeKind {
    /// A struct with named or positional fields.
    Record,
    /// A trait object.
    Interface,
    /// A slice, array or growable collection.
    Array,
    /// An enumeration, `Option` included.
    Enum,
    /// A union.
    Union,
    /// A tuple, closure or other type without a nameable declaration.
    Anonymous,
    /// A type produced by code generation rather than declared by the user.
    Synthetic,
    /// A language primitive or `String`.
    Primitive,
    /// A type declared by a third-party crate.
    External,
}

impl TypeKind {
    /// Returns `true` if the resolution policy may run the correlator on this kind.
    pub fn is_inferable(self) -> bool {
        matches!(self, Self::Record)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Record => "a record",
            Self::Interface => "an interface",
            Self::Array => "an array",
            Self::Enum => "an enumeration",
            Self::Union => "a union",
            Self::Anonymous => "an anonymous type",
            Self::Synthetic => "a synthetic type",
            Self::Primitive => "a primitive",
            Self::External => "an external type",
        };
        f.write_str(label)
    }
}

/// A handle on a [`Shaped`] type: identity, name and metadata.
///
/// `TypeRef` is `Copy` and can be built in `static` initializers, which is how the generated
/// tables refer to constructor parameter types.
#[derive(Clone, Copy)]
pub struct TypeRef {
    id: fn() -> TypeId,
    name: fn() -> &'static str,
    info: fn() -> &'static ClassInfo,
}

impl TypeRef {
    /// Returns the handle for `T`.
    pub const fn of<T: Shaped + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>,
            name: std::any::type_name::<T>,
            info: T::shape_info,
        }
    }

    /// The `TypeId` of the referenced type.
    pub fn id(&self) -> TypeId {
        (self.id)()
    }

    /// The full name of the referenced type, as reported by `std::any::type_name`.
    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    /// The metadata table of the referenced type.
    pub fn info(&self) -> &'static ClassInfo {
        (self.info)()
    }

    /// The key of the referenced type.
    pub fn key(&self) -> TypeKey {
        TypeKey {
            id: self.id,
            name: self.name,
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TypeRef {}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.name())
    }
}

/// Identity and name of any `'static` type, [`Shaped`] or not.
///
/// Method return types are recorded as keys because accessors may return types that never
/// take part in resolution themselves.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: fn() -> TypeId,
    name: fn() -> &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub const fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>,
            name: std::any::type_name::<T>,
        }
    }

    /// The `TypeId` of the keyed type.
    pub fn id(&self) -> TypeId {
        (self.id)()
    }

    /// The full name of the keyed type.
    pub fn name(&self) -> &'static str {
        (self.name)()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TypeKey {}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name())
    }
}

/// The static metadata table of a type.
#[derive(Debug, Clone, Copy)]
pub struct ClassInfo {
    /// The broad category of the type.
    pub kind: TypeKind,
    /// Associated functions returning `Self`, in declaration order.
    pub constructors: &'static [ConstructorInfo],
    /// `&self` methods, in declaration order.
    pub methods: &'static [MethodInfo],
    /// Present when the type projects itself onto a carrier type.
    pub projection: Option<Projection>,
    /// Present for enumerations deriving `ShapeEnum`.
    pub enumeration: Option<EnumInfo>,
}

impl ClassInfo {
    /// A table with no members, for types that are only ever bridged.
    pub const fn of_kind(kind: TypeKind) -> Self {
        Self {
            kind,
            constructors: &[],
            methods: &[],
            projection: None,
            enumeration: None,
        }
    }
}

/// A candidate constructor: an associated function returning `Self`.
#[derive(Debug, Clone, Copy)]
pub struct ConstructorInfo {
    /// Function name.
    pub name: &'static str,
    /// Parameters in declaration order.
    pub params: &'static [ParamInfo],
    /// Lowered body.
    pub body: &'static [Insn],
    /// `true` when the function carries `#[shape(constructor)]`.
    pub marked: bool,
    /// Calls the function.
    pub invoke: ConstructorFn,
}

/// A constructor parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    /// Binding name, or `_` for destructuring patterns.
    pub name: &'static str,
    /// Declared static type.
    pub ty: TypeRef,
}

/// A `&self` method.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo {
    /// Method name.
    pub name: &'static str,
    /// Number of parameters besides the receiver.
    pub argc: usize,
    /// Lowered body.
    pub body: &'static [Insn],
    /// Owned form of the return type: `&T` is recorded as `T`, `&str` as `String` and `&[T]`
    /// as `Vec<T>`. `None` when the method cannot be invoked through [`MethodInfo::invoke`].
    pub returns: Option<TypeKey>,
    /// Calls a zero-argument method and returns an owned copy of its result.
    pub invoke: Option<AccessorFn>,
}

/// The projection of a self-describing type onto its carrier.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    /// The carrier type, which must itself resolve to a composite.
    pub carrier: TypeRef,
    /// Subject → carrier.
    pub to_carrier: AccessorFn,
    /// Carrier → subject.
    pub from_carrier: fn(Object) -> Result<Object>,
}

/// Variant table of a field-less enumeration.
#[derive(Debug, Clone, Copy)]
pub struct EnumInfo {
    /// Variant names in declaration order.
    pub variants: &'static [&'static str],
    /// Index of the variant held by the instance, or `None` if the instance is of another type.
    pub index_of: fn(&dyn Any) -> Option<usize>,
    /// Builds the variant at the given index.
    pub from_index: fn(usize) -> Option<Object>,
}

/// Opt-in contract for types that provide their own projection onto a carrier type.
///
/// Declare it with `#[shape(self_describing)]` on the type's `impl` block; inference is then
/// skipped for the type and runs on the carrier instead.
pub trait SelfDescribing: Sized {
    /// The type actually decomposed and constructed.
    type Carrier: Shaped + Send;

    /// Projects `self` onto its carrier.
    fn to_carrier(&self) -> Self::Carrier;

    /// Rebuilds the subject from its carrier.
    fn from_carrier(carrier: Self::Carrier) -> Self;
}

// --- BUILT-IN IMPLEMENTATIONS ---

macro_rules! impl_shaped {
    ($kind:expr => $($t:ty),* $(,)?) => {
        $(
            impl Shaped for $t {
                fn shape_info() -> &'static ClassInfo {
                    static INFO: ClassInfo = ClassInfo::of_kind($kind);
                    &INFO
                }
            }
        )*
    }
}

impl_shaped!(TypeKind::Primitive =>
    (), bool, char, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String,
);

impl_shaped!(TypeKind::Array => str);

impl<T: Shaped> Shaped for Vec<T> {
    fn shape_info() -> &'static ClassInfo {
        static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Array);
        &INFO
    }
}

impl<T: Shaped> Shaped for [T] {
    fn shape_info() -> &'static ClassInfo {
        static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Array);
        &INFO
    }
}

impl<T: Shaped, const N: usize> Shaped for [T; N] {
    fn shape_info() -> &'static ClassInfo {
        static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Array);
        &INFO
    }
}

impl<T: Shaped> Shaped for Option<T> {
    fn shape_info() -> &'static ClassInfo {
        static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Enum);
        &INFO
    }
}

macro_rules! impl_shaped_tuple {
    ($(($($name:ident),+)),* $(,)?) => {
        $(
            impl<$($name: Shaped),+> Shaped for ($($name,)+) {
                fn shape_info() -> &'static ClassInfo {
                    static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Anonymous);
                    &INFO
                }
            }
        )*
    }
}

impl_shaped_tuple!((A), (A, B), (A, B, C), (A, B, C, D));

impl_shaped!(TypeKind::External => std::time::Duration);

#[cfg(feature = "uuid")]
impl_shaped!(TypeKind::External => uuid::Uuid);
