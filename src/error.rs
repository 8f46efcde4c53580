//! Centralized error handling for shapecode.
//!
//! Every fallible operation in the crate returns [`Result`], and every failure is one of the
//! [`ShapeError`] variants. Library code never panics; the crate root enforces this with
//! `#![deny(clippy::unwrap_used)]` and `#![deny(clippy::panic)]`.
//!
//! ## Error Categories
//!
//! - **Structural inference** ([`ShapeError::StructuralInference`]): the constructor/accessor
//!   correlation for a type could not be verified. The type needs an explicit bridge or a
//!   self-describing projection.
//! - **Unsupported types** ([`ShapeError::UnsupportedType`]): trait objects, collections,
//!   enumerations, tuples and other kinds that are never inferred.
//! - **Conversion** ([`ShapeError::Conversion`]): a raw value did not fit the component it was
//!   composed into. The error names the owning type and the failing component.
//! - **Registration conflicts** ([`ShapeError::RegistrationConflict`]): a descriptor already
//!   exists for the type.
//! - **Internal** ([`ShapeError::Internal`]): logic errors that indicate a bug.
//!
//! Resolution failures are never cached, so retrying after registering a bridge works:
//!
//! ```rust
//! use shapecode::{ShapeContext, ShapeError};
//!
//! let context = ShapeContext::new();
//! match context.resolve::<Vec<u32>>() {
//!     Err(ShapeError::UnsupportedType { kind, .. }) => println!("needs a bridge: {kind}"),
//!     other => println!("unexpected: {other:?}"),
//! }
//!
//! context.register_collection::<u32>()?;
//! assert!(context.resolve::<Vec<u32>>()?.is_atomic());
//! # Ok::<(), ShapeError>(())
//! ```

use std::fmt;

use crate::meta::TypeKind;

/// A specialized `Result` type for shapecode operations.
pub type Result<T> = std::result::Result<T, ShapeError>;

/// The master error enum covering all failure domains in shapecode.
///
/// The type is `Clone` so that a resolution failure observed by one thread can be handed to
/// others without re-running inference.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeError {
    /// The constructor/accessor correlation for a type is incomplete or ambiguous.
    ///
    /// ## Common Causes
    ///
    /// - The type has no constructor returning `Self`, or several without a marked one.
    /// - A constructor parameter is stored behind control flow or combined with another one.
    /// - A field is stored more than once.
    /// - A correlated field has no accessor returning it unchanged.
    /// - The type graph is recursive or deeper than the configured limit.
    StructuralInference {
        /// Name of the type being resolved.
        type_name: String,
        /// Why the correlation could not be verified.
        reason: String,
    },

    /// The type belongs to a kind that is never inferred and has no registered bridge.
    UnsupportedType {
        /// Name of the rejected type.
        type_name: String,
        /// The kind that caused the rejection.
        kind: TypeKind,
    },

    /// A value could not be converted to or from its component.
    Conversion {
        /// Name of the type owning the failing component.
        type_name: String,
        /// The failing component, when the failure is tied to one.
        component: Option<String>,
        /// Position of the failing component in the canonical order.
        position: Option<usize>,
        /// Description of the failure.
        reason: String,
    },

    /// A descriptor is already registered for the type. Descriptors are never overwritten.
    RegistrationConflict {
        /// Name of the type that was registered twice.
        type_name: String,
    },

    /// Logic error inside the library. Please report it with a reproduction.
    Internal(String),
}

impl ShapeError {
    /// Builds a [`ShapeError::StructuralInference`].
    pub fn inference(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StructuralInference {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`ShapeError::Conversion`] that is not tied to a component.
    pub fn conversion(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            component: None,
            position: None,
            reason: reason.into(),
        }
    }

    /// Builds a [`ShapeError::Conversion`] for the component `name` at `position`.
    pub fn component(
        type_name: impl Into<String>,
        name: &str,
        position: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            component: Some(name.to_string()),
            position: Some(position),
            reason: reason.into(),
        }
    }

    /// Wraps `self` as the cause of a failure in component `name` of `type_name`.
    ///
    /// Nested conversion failures keep their own context inside the reason, so the final
    /// message reads from the outermost type down to the failing leaf.
    pub fn within(self, type_name: &str, name: &str, position: usize) -> Self {
        match self {
            Self::Conversion { .. } => Self::component(type_name, name, position, self.to_string()),
            other => other,
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuralInference { type_name, reason } => {
                write!(f, "Structural Inference Error: {type_name}: {reason}")
            }
            Self::UnsupportedType { type_name, kind } => write!(
                f,
                "Unsupported Type Error: {type_name} is {kind} and requires explicit registration"
            ),
            Self::Conversion {
                type_name,
                component: Some(component),
                position: Some(position),
                reason,
            } => write!(
                f,
                "Conversion Error: {type_name}.{component} (position {position}): {reason}"
            ),
            Self::Conversion {
                type_name, reason, ..
            } => write!(f, "Conversion Error: {type_name}: {reason}"),
            Self::RegistrationConflict { type_name } => write!(
                f,
                "Registration Conflict Error: a descriptor for {type_name} already exists"
            ),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for ShapeError {}
