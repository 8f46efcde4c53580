#![allow(missing_docs)]

use shapecode::meta::{ClassInfo, Shaped, TypeKind};
use shapecode::{
    ArrayMapper, Classification, DataBridge, MapMapper, SelfDescribing, ShapeContext, ShapeEnum,
    ShapeError, Value, shape,
};
use uuid::Uuid;

// --- MOCK DATA STRUCTURES ---

/// Uuid ↔ canonical hyphenated text.
struct UuidText;

impl DataBridge<Uuid, String> for UuidText {
    fn to_data(&self, value: &Uuid) -> String {
        value.to_string()
    }

    fn to_object(&self, data: String) -> Result<Uuid, String> {
        Uuid::parse_str(&data).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    id: Uuid,
    owner: String,
}

#[shape]
impl Account {
    pub fn new(id: Uuid, owner: String) -> Self {
        Self { id, owner }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[derive(ShapeEnum, Debug, Clone, Copy, PartialEq)]
pub enum Status {
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    number: u32,
    status: Status,
}

#[shape]
impl Ticket {
    pub fn new(number: u32, status: Status) -> Self {
        Self { number, status }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    x: i16,
    y: i16,
}

#[shape]
impl Vertex {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> i16 {
        self.x
    }

    pub fn y(&self) -> i16 {
        self.y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vertex>,
    tags: Vec<String>,
}

#[shape]
impl Polygon {
    pub fn new(vertices: Vec<Vertex>, tags: Vec<String>) -> Self {
        Self { vertices, tags }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    nickname: Option<String>,
}

#[shape]
impl Profile {
    pub fn new(name: String, nickname: Option<String>) -> Self {
        Self { name, nickname }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nickname(&self) -> Option<String> {
        self.nickname.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionParts {
    major: u16,
    minor: u16,
}

#[shape]
impl VersionParts {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u16 {
        self.major
    }

    pub fn minor(&self) -> u16 {
        self.minor
    }
}

/// Stored packed; exposed through its parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Version {
    packed: u32,
}

#[shape(self_describing)]
impl Version {
    pub fn packed(&self) -> u32 {
        self.packed
    }
}

impl SelfDescribing for Version {
    type Carrier = VersionParts;

    fn to_carrier(&self) -> VersionParts {
        VersionParts::new((self.packed >> 16) as u16, self.packed as u16)
    }

    fn from_carrier(carrier: VersionParts) -> Self {
        Self {
            packed: (u32::from(carrier.major) << 16) | u32::from(carrier.minor),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    name: String,
    version: Version,
}

#[shape]
impl Release {
    pub fn new(name: String, version: Version) -> Self {
        Self { name, version }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

/// A self-describing type whose carrier is atomic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flags {
    bits: u8,
}

#[shape(self_describing)]
impl Flags {}

impl SelfDescribing for Flags {
    type Carrier = u8;

    fn to_carrier(&self) -> u8 {
        self.bits
    }

    fn from_carrier(bits: u8) -> Self {
        Self { bits }
    }
}

pub trait Drawable {}

impl Shaped for dyn Drawable {
    fn shape_info() -> &'static ClassInfo {
        static INFO: ClassInfo = ClassInfo::of_kind(TypeKind::Interface);
        &INFO
    }
}

// --- TESTS ---

#[test]
fn test_uuid_passes_through_its_bridge() {
    let context = ShapeContext::new();
    assert!(matches!(
        context.resolve::<Account>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::External,
            ..
        })
    ));

    let bridge = context.register_atom::<Uuid, String, _>(UuidText).unwrap();
    assert!(bridge.is_atomic());
    assert!(bridge.components().is_empty());

    let account = Account::new(Uuid::new_v4(), "ada".to_string());
    let mapper = ArrayMapper::new(&context);
    let values = mapper.decompose(&account).unwrap();
    assert_eq!(
        values,
        vec![
            Value::String(account.id.to_string()),
            Value::String("ada".into())
        ]
    );
    assert_eq!(mapper.compose::<Account>(values).unwrap(), account);
}

#[test]
fn test_bridge_failures_name_the_component() {
    let context = ShapeContext::new();
    context.register_atom::<Uuid, String, _>(UuidText).unwrap();

    let err = ArrayMapper::new(&context)
        .compose::<Account>(vec![Value::String("not-a-uuid".into()), Value::String("ada".into())])
        .unwrap_err();
    let ShapeError::Conversion {
        component,
        position,
        ..
    } = &err
    else {
        panic!("expected a conversion error, got {err:?}");
    };
    assert_eq!(component.as_deref(), Some("id"));
    assert_eq!(*position, Some(0));
}

#[test]
fn test_enum_requires_registration() {
    let context = ShapeContext::new();
    assert!(matches!(
        context.resolve::<Ticket>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::Enum,
            ..
        })
    ));

    context.register_enum::<Status>().unwrap();
    let ticket = Ticket::new(12, Status::Suspended);

    let values = ArrayMapper::new(&context).decompose(&ticket).unwrap();
    assert_eq!(values, vec![Value::U32(12), Value::String("Suspended".into())]);
    assert_eq!(
        ArrayMapper::new(&context).compose::<Ticket>(values).unwrap(),
        ticket
    );

    let err = ArrayMapper::new(&context)
        .compose::<Ticket>(vec![Value::U32(1), Value::String("Deleted".into())])
        .unwrap_err();
    assert!(err.to_string().contains("unknown variant `Deleted`"));
}

#[test]
fn test_enum_bridge_covers_every_variant() {
    let context = ShapeContext::new();
    let descriptor = context.register_enum::<Status>().unwrap();

    for (status, name) in [
        (Status::Active, "Active"),
        (Status::Suspended, "Suspended"),
        (Status::Closed, "Closed"),
    ] {
        let value = descriptor.to_value(&status).unwrap();
        assert_eq!(value, Value::String(name.into()));
        let back = descriptor.from_value(value).unwrap();
        assert_eq!(back.downcast_ref::<Status>(), Some(&status));
    }
}

#[test]
fn test_collections_of_composites_and_atoms() {
    let context = ShapeContext::new();
    assert!(matches!(
        context.resolve::<Polygon>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::Array,
            ..
        })
    ));

    context.register_collection::<Vertex>().unwrap();
    context.register_collection::<String>().unwrap();

    let polygon = Polygon::new(
        vec![Vertex::new(0, 0), Vertex::new(4, 0), Vertex::new(0, 3)],
        vec!["triangle".into()],
    );
    let values = ArrayMapper::new(&context).decompose(&polygon).unwrap();
    assert_eq!(
        values[0],
        Value::Seq(vec![
            Value::Seq(vec![Value::I16(0), Value::I16(0)]),
            Value::Seq(vec![Value::I16(4), Value::I16(0)]),
            Value::Seq(vec![Value::I16(0), Value::I16(3)]),
        ])
    );
    assert_eq!(values[1], Value::Seq(vec![Value::String("triangle".into())]));

    let back: Polygon = ArrayMapper::new(&context).compose(values).unwrap();
    assert_eq!(back, polygon);

    let map = MapMapper::new(&context).to_map(&polygon).unwrap();
    assert_eq!(MapMapper::new(&context).from_map::<Polygon>(&map).unwrap(), polygon);
}

#[test]
fn test_optional_components() {
    let context = ShapeContext::new();
    context.register_optional::<String>().unwrap();
    let mapper = ArrayMapper::new(&context);

    let named = Profile::new("grace".into(), Some("amazing".into()));
    let values = mapper.decompose(&named).unwrap();
    assert_eq!(values[1], Value::String("amazing".into()));
    assert_eq!(mapper.compose::<Profile>(values).unwrap(), named);

    let anonymous = Profile::new("grace".into(), None);
    let values = mapper.decompose(&anonymous).unwrap();
    assert_eq!(values[1], Value::Unit);
    assert_eq!(mapper.compose::<Profile>(values).unwrap(), anonymous);
}

#[test]
fn test_self_describing_projection() {
    let context = ShapeContext::new();
    let descriptor = context.resolve::<Version>().unwrap();

    assert_eq!(descriptor.classification(), Classification::SelfDescribing);
    assert!(descriptor.is_self_describing());
    assert_ne!(descriptor.subject(), descriptor.carrier());
    assert_eq!(descriptor.constructor_name(), Some("new"));

    let names: Vec<_> = descriptor.components().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["major", "minor"]);

    let version = Version { packed: (1 << 16) | 7 };
    assert_eq!(version.packed(), 65543);
    let mapper = ArrayMapper::new(&context);
    let values = mapper.decompose(&version).unwrap();
    assert_eq!(values, vec![Value::U16(1), Value::U16(7)]);
    assert_eq!(mapper.compose::<Version>(values).unwrap(), version);

    let map = MapMapper::new(&context).to_map(&version).unwrap();
    assert_eq!(map["minor"], Value::U16(7));
    assert_eq!(MapMapper::new(&context).from_map::<Version>(&map).unwrap(), version);
}

#[test]
fn test_self_describing_components_nest() {
    let context = ShapeContext::new();
    let release = Release::new("spring".into(), Version { packed: 2 << 16 });

    let values = ArrayMapper::new(&context).decompose(&release).unwrap();
    assert_eq!(
        values,
        vec![
            Value::String("spring".into()),
            Value::Seq(vec![Value::U16(2), Value::U16(0)]),
        ]
    );
    assert_eq!(
        ArrayMapper::new(&context).compose::<Release>(values).unwrap(),
        release
    );
}

#[test]
fn test_self_describing_carrier_must_be_inferred() {
    let context = ShapeContext::new();
    let err = context.resolve::<Flags>().unwrap_err();
    assert!(
        matches!(&err, ShapeError::StructuralInference { reason, .. } if reason.contains("atomic")),
        "unexpected error: {err}"
    );
    assert_eq!(Flags::from_carrier(3).to_carrier(), 3);
}

#[test]
fn test_unsupported_kinds_are_rejected() {
    let context = ShapeContext::new();

    assert!(matches!(
        context.resolve::<dyn Drawable>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::Interface,
            ..
        })
    ));
    assert!(matches!(
        context.resolve::<Status>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::Enum,
            ..
        })
    ));
    assert!(matches!(
        context.resolve::<(i32, i32)>(),
        Err(ShapeError::UnsupportedType {
            kind: TypeKind::Anonymous,
            ..
        })
    ));
    assert!(matches!(
        context.resolve::<Option<i32>>(),
        Err(ShapeError::UnsupportedType { .. })
    ));
}

#[test]
fn test_registration_conflicts() {
    let context = ShapeContext::new();
    context.register_enum::<Status>().unwrap();
    assert!(matches!(
        context.register_enum::<Status>(),
        Err(ShapeError::RegistrationConflict { .. })
    ));

    // Inferred descriptors are never replaced by a bridge either.
    context.resolve::<Vertex>().unwrap();
    let err = context
        .register_bridge(shapecode::AtomicBridge::new(
            shapecode::TypeRef::of::<Vertex>(),
            "unit",
            |_| Ok(Value::Unit),
            |_| Ok(shapecode::rt::boxed(Vertex::new(0, 0))),
        ))
        .unwrap_err();
    assert!(matches!(err, ShapeError::RegistrationConflict { .. }));
    assert_eq!(
        context.resolve::<Vertex>().unwrap().classification(),
        Classification::Inferred
    );
}

#[test]
fn test_corrupted_map_is_a_conversion_error() {
    let context = ShapeContext::new();
    let mapper = MapMapper::new(&context);

    let mut map = mapper.to_map(&Vertex::new(1, 2)).unwrap();
    map.insert("x".to_string(), Value::String("error".into()));

    let err = mapper.from_map::<Vertex>(&map).unwrap_err();
    let ShapeError::Conversion {
        type_name,
        component,
        ..
    } = &err
    else {
        panic!("expected a conversion error, got {err:?}");
    };
    assert!(type_name.ends_with("Vertex"));
    assert_eq!(component.as_deref(), Some("x"));

    map.remove("x");
    let err = mapper.from_map::<Vertex>(&map).unwrap_err();
    assert!(err.to_string().contains("missing from map"));
}

#[test]
fn test_atomic_types_have_no_map_form() {
    let context = ShapeContext::new();
    let err = MapMapper::new(&context).to_map(&5_i32).unwrap_err();
    assert!(matches!(err, ShapeError::Conversion { .. }));
}
