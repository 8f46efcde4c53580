//! The constructor/accessor correlator.
//!
//! Given a type's metadata and its designated constructor, the correlator recovers for each
//! constructor parameter the field it initializes and the accessor that reads the field back.
//! It never guesses: the result covers every parameter exactly once or the type is rejected
//! with [`ShapeError::StructuralInference`].
//!
//! ## Constructor walk
//!
//! The constructor body is interpreted over an abstract operand stack. Every abstract value
//! records where it came from: the object under construction, a constant, a set of parameters,
//! or something unknown. Arithmetic, casts and transparent calls (see
//! [`ShapeConfig::transparent_calls`]) keep the parameter set of their operands, so
//! `Self { y: y * K / K }` still ties `y` to its parameter. A `PutField` whose value derives
//! from exactly one parameter, stored into the object under construction, records a
//! correlation.
//!
//! Control flow ends the basic block: the operand stack and all locals lose their provenance.
//! A field stored more than once in the body is ambiguous and never correlated.
//!
//! ## Accessor walk
//!
//! Every zero-argument `&self` method whose body is exactly a read of one field (optionally
//! through transparent calls) is an accessor candidate for that field. The candidate must be
//! invocable and its owned return type must be the component type. A method named like the
//! field wins over other candidates; otherwise declaration order decides.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::config::ShapeConfig;
use crate::error::{Result, ShapeError};
use crate::ir::{Insn, disassemble};
use crate::meta::{ClassInfo, ConstructorInfo, MethodInfo, TypeRef};

/// A constructor parameter matched with the field it initializes.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatedField {
    /// Field identifier.
    pub name: &'static str,
    /// Index of the constructor parameter.
    pub position: usize,
    /// Declared type of the constructor parameter.
    pub value_type: TypeRef,
    /// The accessor reading the field back, if one was found.
    pub accessor: Option<&'static MethodInfo>,
}

/// Abstract value tracked by the constructor walk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Provenance {
    /// The object under construction.
    SelfRef,
    /// A literal, constant or static.
    Const,
    /// Derived from these parameters only.
    Params(BTreeSet<usize>),
    Unknown,
}

impl Provenance {
    fn combine(self, other: Provenance) -> Provenance {
        match (self, other) {
            (Self::Const, Self::Const) => Self::Const,
            (Self::Params(p), Self::Const) | (Self::Const, Self::Params(p)) => Self::Params(p),
            (Self::Params(mut a), Self::Params(b)) => {
                a.extend(b);
                Self::Params(a)
            }
            _ => Self::Unknown,
        }
    }

    fn transform(self) -> Provenance {
        match self {
            Self::Const | Self::Params(_) => self,
            _ => Self::Unknown,
        }
    }

    fn single_param(&self) -> Option<usize> {
        match self {
            Self::Params(params) if params.len() == 1 => params.first().copied(),
            _ => None,
        }
    }
}

/// A `PutField` observed in the constructor body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Store {
    field: &'static str,
    param: Option<usize>,
}

/// Abstract machine state for one basic block.
#[derive(Debug, Default)]
struct Frame {
    stack: Vec<Provenance>,
    locals: BTreeMap<usize, Provenance>,
}

impl Frame {
    fn push(&mut self, value: Provenance) {
        self.stack.push(value);
    }

    // Values pushed in an earlier block are gone; reading past them yields Unknown.
    fn pop(&mut self) -> Provenance {
        self.stack.pop().unwrap_or(Provenance::Unknown)
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.locals.clear();
    }
}

/// Runs the constructor and accessor walks for one type.
#[derive(Debug)]
pub struct Correlator<'c> {
    config: &'c ShapeConfig,
}

impl<'c> Correlator<'c> {
    /// Creates a correlator using the transparent calls of `config`.
    pub fn new(config: &'c ShapeConfig) -> Self {
        Self { config }
    }

    /// Correlates `ctor` with the fields and accessors of the type described by `info`.
    ///
    /// The result is ordered by constructor parameter and has one entry per parameter.
    /// Accessors are looked up but not required here; a missing accessor is reported when the
    /// pipeline is compiled.
    pub fn correlate(
        &self,
        type_name: &str,
        info: &'static ClassInfo,
        ctor: &'static ConstructorInfo,
    ) -> Result<Vec<CorrelatedField>> {
        let param_count = ctor.params.len();
        if param_count == 0 {
            return Err(ShapeError::inference(
                type_name,
                format!(
                    "constructor `{}` takes no parameters, so the type has no components",
                    ctor.name
                ),
            ));
        }

        // 1. Constructor walk.
        let stores = self.walk_constructor(ctor);
        let fields = self.identify_arguments(type_name, &stores);

        // 2. Verification: every parameter initializes exactly one field.
        let mut by_param: Vec<Vec<&'static str>> = vec![Vec::new(); param_count];
        for (&field, &param) in &fields {
            if let Some(slot) = by_param.get_mut(param) {
                slot.push(field);
            }
        }

        if fields.len() != param_count || by_param.iter().any(|f| f.len() != 1) {
            trace!(
                type_name,
                constructor = ctor.name,
                "constructor body:\n{}",
                disassemble(ctor.body)
            );
            let unmatched: Vec<String> = by_param
                .iter()
                .enumerate()
                .filter(|(_, fields)| fields.len() != 1)
                .map(|(i, fields)| {
                    let name = ctor.params[i].name;
                    match fields.len() {
                        0 => format!("`{name}` is not stored unchanged into any field"),
                        n => format!("`{name}` initializes {n} fields ({})", fields.join(", ")),
                    }
                })
                .collect();
            return Err(ShapeError::inference(
                type_name,
                format!(
                    "correlated {} of {} parameters of constructor `{}`: {}",
                    fields.len(),
                    param_count,
                    ctor.name,
                    unmatched.join("; ")
                ),
            ));
        }

        // 3. Accessor walk.
        let candidates = self.find_accessors(info);

        // 4. Assemble in constructor parameter order.
        let correlated = by_param
            .iter()
            .enumerate()
            .filter_map(|(position, fields)| fields.first().map(|name| (position, *name)))
            .map(|(position, name)| {
                let value_type = ctor.params[position].ty;
                let accessor = select_accessor(name, value_type, candidates.get(name));
                trace!(
                    type_name,
                    field = name,
                    position,
                    accessor = accessor.map(|m| m.name),
                    "correlated constructor parameter"
                );
                CorrelatedField {
                    name,
                    position,
                    value_type,
                    accessor,
                }
            })
            .collect();

        Ok(correlated)
    }

    /// Interprets the constructor body and returns every field store in order.
    fn walk_constructor(&self, ctor: &ConstructorInfo) -> Vec<Store> {
        let param_count = ctor.params.len();
        let mut frame = Frame::default();
        let mut stores = Vec::new();

        for insn in ctor.body {
            if insn.ends_block() {
                frame.reset();
                continue;
            }

            match *insn {
                Insn::LoadSelf => frame.push(Provenance::SelfRef),
                Insn::LoadParam(i) if i < param_count => {
                    frame.push(Provenance::Params(BTreeSet::from([i])))
                }
                Insn::LoadParam(_) | Insn::Opaque => frame.push(Provenance::Unknown),
                Insn::LoadLocal(slot) => {
                    let value = frame
                        .locals
                        .get(&slot)
                        .cloned()
                        .unwrap_or(Provenance::Unknown);
                    frame.push(value);
                }
                Insn::StoreLocal(slot) => {
                    let value = frame.pop();
                    frame.locals.insert(slot, value);
                }
                Insn::LoadConst => frame.push(Provenance::Const),
                Insn::GetField(_) => {
                    frame.pop();
                    frame.push(Provenance::Unknown);
                }
                Insn::PutField(field) => {
                    let value = frame.pop();
                    let target = frame.pop();
                    let param = match target {
                        Provenance::SelfRef => value.single_param(),
                        _ => None,
                    };
                    stores.push(Store { field, param });
                }
                Insn::Binary(_) => {
                    let rhs = frame.pop();
                    let lhs = frame.pop();
                    frame.push(lhs.combine(rhs));
                }
                Insn::Unary(_) | Insn::Cast => {
                    let value = frame.pop();
                    frame.push(value.transform());
                }
                Insn::Invoke { name, argc } => {
                    let mut operands: Vec<Provenance> = (0..argc).map(|_| frame.pop()).collect();
                    let result = match operands.pop() {
                        Some(value) if argc == 1 && self.config.is_transparent(name) => value,
                        _ => Provenance::Unknown,
                    };
                    frame.push(result);
                }
                Insn::Pop => {
                    frame.pop();
                }
                Insn::Branch | Insn::Label | Insn::Return => {}
            }
        }

        stores
    }

    /// Reduces the observed stores to `field -> parameter` for unambiguous fields.
    fn identify_arguments(
        &self,
        type_name: &str,
        stores: &[Store],
    ) -> BTreeMap<&'static str, usize> {
        let mut per_field: BTreeMap<&'static str, Vec<Option<usize>>> = BTreeMap::new();
        for store in stores {
            per_field.entry(store.field).or_default().push(store.param);
        }

        per_field
            .into_iter()
            .filter_map(|(field, params)| match params.as_slice() {
                [Some(param)] => Some((field, *param)),
                [_] => None,
                _ => {
                    trace!(
                        type_name,
                        field,
                        stores = params.len(),
                        "field stored more than once, not correlated"
                    );
                    None
                }
            })
            .collect()
    }

    /// Collects accessor candidates per field, in declaration order.
    fn find_accessors(
        &self,
        info: &'static ClassInfo,
    ) -> BTreeMap<&'static str, Vec<&'static MethodInfo>> {
        let mut candidates: BTreeMap<&'static str, Vec<&'static MethodInfo>> = BTreeMap::new();
        for method in info.methods {
            if let Some(field) = self.examine_accessor(method) {
                candidates.entry(field).or_default().push(method);
            }
        }
        candidates
    }

    /// Returns the field read by `method` if its body is `LoadSelf, GetField(f), Return`,
    /// allowing transparent calls between the read and the return.
    ///
    /// Instructions after the first `Return` are unreachable because the matched prefix
    /// contains no branch, so they are ignored.
    fn examine_accessor(&self, method: &MethodInfo) -> Option<&'static str> {
        if method.argc != 0 {
            return None;
        }

        let mut body = method.body.iter();
        let Some(Insn::LoadSelf) = body.next() else {
            return None;
        };
        let Some(Insn::GetField(field)) = body.next() else {
            return None;
        };

        for insn in body {
            match insn {
                Insn::Invoke { name, argc: 1 } if self.config.is_transparent(name) => continue,
                Insn::Return => return Some(*field),
                _ => return None,
            }
        }
        None
    }
}

/// Picks the accessor for `field` among its candidates.
fn select_accessor(
    field: &str,
    value_type: TypeRef,
    candidates: Option<&Vec<&'static MethodInfo>>,
) -> Option<&'static MethodInfo> {
    let usable: Vec<&'static MethodInfo> = candidates
        .into_iter()
        .flatten()
        .copied()
        .filter(|method| {
            method.invoke.is_some() && method.returns == Some(value_type.key())
        })
        .collect();

    usable
        .iter()
        .find(|method| method.name == field)
        .or_else(|| usable.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;
    use crate::meta::{Object, ParamInfo, TypeKey, TypeKind};
    use std::any::Any;

    fn no_ctor(_: Vec<Object>) -> Result<Object> {
        Err(ShapeError::Internal("not invoked".into()))
    }

    fn no_accessor(_: &dyn Any) -> Result<Object> {
        Err(ShapeError::Internal("not invoked".into()))
    }

    const XY: &[ParamInfo] = &[
        ParamInfo {
            name: "x",
            ty: TypeRef::of::<i32>(),
        },
        ParamInfo {
            name: "y",
            ty: TypeRef::of::<i32>(),
        },
    ];

    const fn ctor(body: &'static [Insn]) -> ConstructorInfo {
        ConstructorInfo {
            name: "new",
            params: XY,
            body,
            marked: false,
            invoke: no_ctor,
        }
    }

    const fn accessor(name: &'static str, body: &'static [Insn]) -> MethodInfo {
        MethodInfo {
            name,
            argc: 0,
            body,
            returns: Some(TypeKey::of::<i32>()),
            invoke: Some(no_accessor),
        }
    }

    const ACCESSORS: &[MethodInfo] = &[
        accessor("x", &[Insn::LoadSelf, Insn::GetField("x"), Insn::Return]),
        accessor("y", &[Insn::LoadSelf, Insn::GetField("y"), Insn::Return]),
    ];

    fn info(constructors: &'static [ConstructorInfo]) -> &'static ClassInfo {
        Box::leak(Box::new(ClassInfo {
            kind: TypeKind::Record,
            constructors,
            methods: ACCESSORS,
            projection: None,
            enumeration: None,
        }))
    }

    fn correlate(body: &'static [Insn]) -> Result<Vec<CorrelatedField>> {
        let ctors: &'static [ConstructorInfo] = Box::leak(Box::new([ctor(body)]));
        let config = ShapeConfig::default();
        Correlator::new(&config).correlate("Point", info(ctors), &ctors[0])
    }

    fn names(fields: &[CorrelatedField]) -> Vec<(&str, usize)> {
        fields.iter().map(|f| (f.name, f.position)).collect()
    }

    #[test]
    fn direct_stores_correlate_in_parameter_order() -> Result<()> {
        // Self { y, x } : fields stored out of declaration order.
        let fields = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(1),
            Insn::PutField("y"),
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::Return,
        ])?;
        assert_eq!(names(&fields), vec![("x", 0), ("y", 1)]);
        assert!(fields.iter().all(|f| f.accessor.is_some()));
        Ok(())
    }

    #[test]
    fn arithmetic_through_locals_keeps_provenance() -> Result<()> {
        // let t = y * K; Self { x, y: t / K }
        let fields = correlate(&[
            Insn::LoadParam(1),
            Insn::LoadConst,
            Insn::Binary(BinaryOp::Mul),
            Insn::StoreLocal(0),
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadLocal(0),
            Insn::LoadConst,
            Insn::Binary(BinaryOp::Div),
            Insn::PutField("y"),
            Insn::LoadSelf,
            Insn::Return,
        ])?;
        assert_eq!(names(&fields), vec![("x", 0), ("y", 1)]);
        Ok(())
    }

    #[test]
    fn control_flow_breaks_the_block() {
        // let t = y; if .. {}; Self { x, y: t }
        let err = correlate(&[
            Insn::LoadParam(1),
            Insn::StoreLocal(0),
            Insn::Branch,
            Insn::Label,
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadLocal(0),
            Insn::PutField("y"),
        ])
        .unwrap_err();
        let ShapeError::StructuralInference { reason, .. } = err else {
            panic!("expected a structural inference error");
        };
        assert!(reason.contains("correlated 1 of 2"), "{reason}");
        assert!(reason.contains("`y`"), "{reason}");
    }

    #[test]
    fn mixed_parameters_are_not_correlated() {
        // Self { x: x + y, y }
        let err = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::LoadParam(1),
            Insn::Binary(BinaryOp::Add),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadParam(1),
            Insn::PutField("y"),
        ]);
        assert!(matches!(err, Err(ShapeError::StructuralInference { .. })));
    }

    #[test]
    fn fields_stored_twice_are_ambiguous() {
        let err = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadParam(1),
            Insn::PutField("y"),
            Insn::Branch,
            Insn::Label,
            Insn::LoadSelf,
            Insn::LoadConst,
            Insn::PutField("x"),
        ]);
        assert!(matches!(err, Err(ShapeError::StructuralInference { .. })));
    }

    #[test]
    fn one_parameter_feeding_two_fields_is_rejected() {
        let err = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::PutField("y"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("initializes 2 fields"), "{err}");
    }

    #[test]
    fn opaque_calls_lose_provenance_but_transparent_ones_keep_it() -> Result<()> {
        let err = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::Invoke {
                name: "abs",
                argc: 1,
            },
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadParam(1),
            Insn::PutField("y"),
        ]);
        assert!(err.is_err());

        let fields = correlate(&[
            Insn::LoadSelf,
            Insn::LoadParam(0),
            Insn::Invoke {
                name: "clone",
                argc: 1,
            },
            Insn::PutField("x"),
            Insn::LoadSelf,
            Insn::LoadParam(1),
            Insn::PutField("y"),
        ])?;
        assert_eq!(fields.len(), 2);
        Ok(())
    }

    #[test]
    fn accessor_pattern() {
        let config = ShapeConfig::default();
        let correlator = Correlator::new(&config);

        let plain = accessor("x", &[Insn::LoadSelf, Insn::GetField("x"), Insn::Return]);
        assert_eq!(correlator.examine_accessor(&plain), Some("x"));

        let through_clone = accessor(
            "name",
            &[
                Insn::LoadSelf,
                Insn::GetField("name"),
                Insn::Invoke {
                    name: "clone",
                    argc: 1,
                },
                Insn::Return,
                Insn::Label,
                Insn::LoadConst,
                Insn::Return,
            ],
        );
        assert_eq!(correlator.examine_accessor(&through_clone), Some("name"));

        let computed = accessor(
            "x",
            &[
                Insn::LoadSelf,
                Insn::GetField("x"),
                Insn::LoadConst,
                Insn::Binary(BinaryOp::Mul),
                Insn::Return,
            ],
        );
        assert_eq!(correlator.examine_accessor(&computed), None);
    }

    #[test]
    fn accessor_named_like_the_field_wins() {
        static FIRST: MethodInfo = accessor("get", &[]);
        static NAMED: MethodInfo = accessor("x", &[]);
        let candidates = vec![&FIRST, &NAMED];
        let chosen = select_accessor("x", TypeRef::of::<i32>(), Some(&candidates));
        assert_eq!(chosen.map(|m| m.name), Some("x"));

        let wrong_type = select_accessor("x", TypeRef::of::<i64>(), Some(&candidates));
        assert!(wrong_type.is_none());
    }
}
