//! The resolution policy: decides how a type without a published descriptor is resolved.

use tracing::trace;

use crate::error::{Result, ShapeError};
use crate::meta::{ClassInfo, ConstructorInfo, Projection, TypeRef};

/// What the registry does with a type it has no descriptor for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Plan {
    /// Resolve the carrier, then wrap it.
    SelfDescribing(Projection),
    /// Correlate this constructor and compile an inferred composite.
    Inferred(&'static ConstructorInfo),
}

/// Classifies `ty`, rejecting every kind that is never inferred.
pub(crate) fn classify(ty: TypeRef) -> Result<Plan> {
    let info = ty.info();

    if !info.kind.is_inferable() {
        return Err(ShapeError::UnsupportedType {
            type_name: ty.name().to_string(),
            kind: info.kind,
        });
    }

    if let Some(projection) = info.projection {
        return Ok(Plan::SelfDescribing(projection));
    }

    designate_constructor(ty.name(), info).map(Plan::Inferred)
}

/// Picks the constructor to correlate: the one marked `#[shape(constructor)]`, else the only
/// candidate, else the one named `new`.
pub(crate) fn designate_constructor(
    type_name: &str,
    info: &'static ClassInfo,
) -> Result<&'static ConstructorInfo> {
    let marked: Vec<&'static ConstructorInfo> =
        info.constructors.iter().filter(|c| c.marked).collect();

    let chosen = match (marked.as_slice(), info.constructors) {
        ([only], _) => Ok(*only),
        ([], []) => Err("no usable constructor: no associated function returns `Self`".to_string()),
        ([], [only]) => Ok(only),
        ([], candidates) => candidates.iter().find(|c| c.name == "new").ok_or_else(|| {
            format!(
                "no usable constructor: {} candidates and none is named `new` or marked \
                 `#[shape(constructor)]`",
                candidates.len()
            )
        }),
        (several, _) => Err(format!(
            "{} constructors are marked `#[shape(constructor)]`",
            several.len()
        )),
    };

    let chosen = chosen.map_err(|reason| ShapeError::inference(type_name, reason))?;
    trace!(type_name, constructor = chosen.name, "designated constructor");
    Ok(chosen)
}
