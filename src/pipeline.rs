//! The pipeline compiler.
//!
//! Turns a correlated component list into the two conversion pipelines stored in a
//! [`TypeDescriptor`]. Each pipeline is one closure composed from per-component closures, so a
//! conversion costs one dispatch per component and never looks a type up: the choice between
//! atomic pass-through and recursive conversion is made here, once per type.

use std::any::Any;
use std::sync::Arc;

use crate::bridge::AtomicBridge;
use crate::correlate::CorrelatedField;
use crate::descriptor::{Classification, Component, Compose, Decompose, TypeDescriptor};
use crate::error::{Result, ShapeError};
use crate::meta::{ConstructorFn, ConstructorInfo, Object, Projection, TypeRef};
use crate::value::Value;

/// Reads one component from a carrier instance.
type Reader = Box<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;

/// Converts one raw value to the constructor argument of its position.
type Writer = Box<dyn Fn(Value) -> Result<Object> + Send + Sync>;

/// Publishes a bridge as an atomic descriptor.
///
/// The array form of an atomic type is the one-element sequence holding its raw value.
pub(crate) fn compile_atomic(bridge: AtomicBridge) -> TypeDescriptor {
    let subject = bridge.subject();
    let owner = subject.name();

    let reader = bridge.clone();
    let decompose: Decompose =
        Arc::new(move |object: &dyn Any| Ok(vec![reader.to_data(object)?]));

    let writer = bridge.clone();
    let compose: Compose = Arc::new(move |values: Vec<Value>| {
        let mut values = values.into_iter();
        match (values.next(), values.next()) {
            (Some(value), None) => writer.to_object(value),
            _ => Err(ShapeError::conversion(
                owner,
                "an atomic type composes from exactly one value",
            )),
        }
    });

    TypeDescriptor {
        subject,
        carrier: subject,
        classification: Classification::Atomic,
        components: Vec::new(),
        bridge: Some(bridge),
        constructor: None,
        projection: None,
        decompose,
        compose,
    }
}

/// Compiles an inferred composite.
///
/// `nested` holds the resolved descriptor of each field's type, in the order of `fields`.
/// Fails if a field has no accessor.
pub(crate) fn compile_inferred(
    subject: TypeRef,
    constructor: &'static ConstructorInfo,
    fields: &[CorrelatedField],
    nested: Vec<Arc<TypeDescriptor>>,
) -> Result<TypeDescriptor> {
    let owner = subject.name();

    let components = fields
        .iter()
        .zip(nested)
        .map(|(field, descriptor)| {
            let (accessor_name, accessor) = field
                .accessor
                .and_then(|method| method.invoke.map(|invoke| (method.name, invoke)))
                .ok_or_else(|| {
                    ShapeError::inference(
                        owner,
                        format!(
                            "component `{}` (position {}) has no accessor returning it unchanged",
                            field.name, field.position
                        ),
                    )
                })?;
            Ok(Component {
                name: field.name,
                position: field.position,
                value_type: field.value_type,
                descriptor,
                accessor_name,
                accessor,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let decompose = decompose_pipeline(owner, &components);
    let compose = compose_pipeline(owner, &components, constructor.invoke);

    Ok(TypeDescriptor {
        subject,
        carrier: subject,
        classification: Classification::Inferred,
        components,
        bridge: None,
        constructor: Some(constructor),
        projection: None,
        decompose,
        compose,
    })
}

/// Wraps the inferred descriptor of a carrier for a self-describing subject.
///
/// The subject's pipelines project onto the carrier before decomposing and convert back after
/// composing; the components are the carrier's.
pub(crate) fn compile_self_describing(
    subject: TypeRef,
    projection: Projection,
    carrier: &TypeDescriptor,
) -> TypeDescriptor {
    let to_carrier = projection.to_carrier;
    let inner_decompose = Arc::clone(&carrier.decompose);
    let decompose: Decompose = Arc::new(move |object: &dyn Any| {
        let carrier = to_carrier(object)?;
        let carrier: &dyn Any = &*carrier;
        inner_decompose(carrier)
    });

    let from_carrier = projection.from_carrier;
    let inner_compose = Arc::clone(&carrier.compose);
    let compose: Compose =
        Arc::new(move |values: Vec<Value>| from_carrier(inner_compose(values)?));

    TypeDescriptor {
        subject,
        carrier: carrier.subject,
        classification: Classification::SelfDescribing,
        components: carrier.components.clone(),
        bridge: None,
        constructor: carrier.constructor,
        projection: Some(projection),
        decompose,
        compose,
    }
}

fn decompose_pipeline(owner: &'static str, components: &[Component]) -> Decompose {
    let readers: Vec<Reader> = components.iter().map(|c| reader(owner, c)).collect();
    Arc::new(move |carrier: &dyn Any| {
        readers
            .iter()
            .map(|read| read(carrier))
            .collect::<Result<Vec<Value>>>()
    })
}

fn compose_pipeline(
    owner: &'static str,
    components: &[Component],
    constructor: ConstructorFn,
) -> Compose {
    let writers: Vec<Writer> = components.iter().map(|c| writer(owner, c)).collect();
    Arc::new(move |values: Vec<Value>| {
        if values.len() != writers.len() {
            return Err(ShapeError::conversion(
                owner,
                format!(
                    "expected {} values, received {}",
                    writers.len(),
                    values.len()
                ),
            ));
        }
        let args = values
            .into_iter()
            .zip(&writers)
            .map(|(value, write)| write(value))
            .collect::<Result<Vec<Object>>>()?;
        constructor(args)
    })
}

fn reader(owner: &'static str, component: &Component) -> Reader {
    let name = component.name;
    let position = component.position;
    let accessor = component.accessor;

    match component.descriptor.bridge.clone() {
        Some(bridge) => Box::new(move |carrier: &dyn Any| {
            let raw = accessor(carrier).map_err(|e| e.within(owner, name, position))?;
            bridge
                .to_data(&*raw)
                .map_err(|e| e.within(owner, name, position))
        }),
        None => {
            let nested = Arc::clone(&component.descriptor.decompose);
            Box::new(move |carrier: &dyn Any| {
                let raw = accessor(carrier).map_err(|e| e.within(owner, name, position))?;
                let raw: &dyn Any = &*raw;
                nested(raw)
                    .map(Value::Seq)
                    .map_err(|e| e.within(owner, name, position))
            })
        }
    }
}

fn writer(owner: &'static str, component: &Component) -> Writer {
    let name = component.name;
    let position = component.position;

    match component.descriptor.bridge.clone() {
        Some(bridge) => Box::new(move |value: Value| {
            bridge
                .to_object(value)
                .map_err(|e| e.within(owner, name, position))
        }),
        None => {
            let nested = Arc::clone(&component.descriptor.compose);
            Box::new(move |value: Value| match value {
                Value::Seq(values) => nested(values).map_err(|e| e.within(owner, name, position)),
                other => Err(ShapeError::component(
                    owner,
                    name,
                    position,
                    format!("expected sequence, found {}", other.kind_name()),
                )),
            })
        }
    }
}
