//! Configuration of a [`ShapeContext`](crate::ShapeContext).

/// Method names treated as identity by the correlator by default.
///
/// A value passed through one of these calls keeps its provenance, so `Self { name:
/// name.clone() }` still correlates and `fn name(&self) -> &str { self.name.as_str() }` still
/// counts as an accessor.
pub const DEFAULT_TRANSPARENT_CALLS: &[&str] =
    &["clone", "to_owned", "as_str", "as_slice", "as_ref", "borrow"];

/// Default limit on the nesting depth of resolved types.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Settings shared by the resolution policy and the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeConfig {
    /// Maximum nesting depth of a type graph. Resolution fails beyond it.
    pub max_depth: usize,
    /// Calls that do not change the value they are applied to.
    pub transparent_calls: Vec<String>,
    /// Publish identity bridges for primitives, `String` and `Vec<u8>` when the context is built.
    pub register_primitives: bool,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            transparent_calls: DEFAULT_TRANSPARENT_CALLS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            register_primitives: true,
        }
    }
}

impl ShapeConfig {
    /// Returns `true` if `name` is a transparent call.
    pub fn is_transparent(&self, name: &str) -> bool {
        self.transparent_calls.iter().any(|call| call == name)
    }
}
