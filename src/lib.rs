//! # Shapecode
//!
//! Infers the structural shape of immutable types and compiles it into compose/decompose
//! pipelines, without per-type serialization code.
//!
//! ## Overview
//!
//! An immutable record has no setters: its state goes in through a constructor and comes out
//! through accessor methods. Shapecode reads both ends. It lowers constructor and accessor bodies
//! into a small instruction list at compile time (see [`ir`]), then at runtime correlates which
//! constructor parameter is stored, unchanged, into which field and which accessor reads that
//! field back. The result is a [`TypeDescriptor`]: an ordered list of components plus two
//! compiled pipelines.
//!
//! *   **Decompose:** instance → `Vec<Value>` (array form), one value per component.
//! *   **Compose:** `Vec<Value>` → instance, through the designated constructor.
//!
//! Nested composite components decompose recursively into [`Value::Seq`]; atomic components
//! (primitives, strings, enums, collections and anything with a registered bridge) become a
//! single scalar value.
//!
//! ## Core Concepts
//!
//! ### `Shaped`
//!
//! Rust has no runtime reflection, so every type taking part in resolution implements
//! [`Shaped`]. For records this comes from `#[shape]` on the inherent `impl` block; for field-less
//! enums from `#[derive(ShapeEnum)]`.
//!
//! ### Resolution Policy
//!
//! [`ShapeContext::resolve`] classifies a type in a fixed order:
//!
//! 1. A registered [`AtomicBridge`] makes it **atomic**.
//! 2. A type declared `#[shape(self_describing)]` is resolved through its carrier.
//! 3. Otherwise a record is **inferred** structurally; any other kind is rejected.
//!
//! Descriptors are published once per type and shared as `Arc`s. Resolution is safe to call
//! from any number of threads.
//!
//! ### Mappers
//!
//! [`ArrayMapper`] and [`MapMapper`] are the typed entry points: the first converts to and from
//! the array form, the second to and from a name-keyed [`ValueMap`].
//!
//! ## Usage
//!
//! ```rust
//! use shapecode::{ArrayMapper, ShapeContext, Value, shape};
//!
//! #[derive(Debug, PartialEq)]
//! pub struct Reading {
//!     sensor: String,
//!     celsius: f64,
//! }
//!
//! #[shape]
//! impl Reading {
//!     pub fn new(sensor: String, celsius: f64) -> Self {
//!         Self { sensor, celsius }
//!     }
//!
//!     pub fn sensor(&self) -> &str {
//!         &self.sensor
//!     }
//!
//!     pub fn celsius(&self) -> f64 {
//!         self.celsius
//!     }
//! }
//!
//! let context = ShapeContext::new();
//! let mapper = ArrayMapper::new(&context);
//!
//! let values = mapper.decompose(&Reading::new("north".into(), 21.5))?;
//! assert_eq!(values, vec![Value::String("north".into()), Value::F64(21.5)]);
//! # Ok::<(), shapecode::ShapeError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate forbids `unsafe` code.
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`ShapeError`] variant.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the generated code name `::shapecode` from inside this crate's own tests and docs.
extern crate self as shapecode;

// --- PUBLIC API MODULES ---
pub mod bridge;
pub mod config;
pub mod context;
pub mod correlate;
pub mod descriptor;
pub mod error;
pub mod inspector;
pub mod ir;
pub mod mapper;
pub mod meta;
pub mod value;

// Private modules
mod pipeline;
mod policy;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the generated code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use bridge::{AtomicBridge, DataBridge};
pub use config::ShapeConfig;
pub use context::{ShapeContext, ShapeContextBuilder};
pub use descriptor::{Classification, Component, TypeDescriptor};
pub use error::{Result, ShapeError};
pub use inspector::ShapeReport;
pub use mapper::{ArrayMapper, MapMapper};
pub use meta::{Object, SelfDescribing, Shaped, TypeKind, TypeRef};
pub use value::{FromValue, Value, ValueMap};

// Re-export the macros so they are accessible as `shapecode::shape` and `shapecode::ShapeEnum`
pub use shapecode_derive::{ShapeEnum, shape};
