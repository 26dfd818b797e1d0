use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The scalar kinds a node value can take, each with a stable wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Timestamp,
    Uuid,
    Bytes,
}

impl ValueKind {
    pub const ALL: [ValueKind; 16] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Char,
        Self::String,
        Self::Timestamp,
        Self::Uuid,
        Self::Bytes,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Bytes => "bytes",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// A node's payload.
///
/// Absence is modelled as `Option<NodeValue>` by the tree, so every variant
/// here carries data.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Composite(Composite),
}

impl NodeValue {
    /// Scalar kind, or `None` for composites.
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::I8(_) => ValueKind::I8,
            Self::I16(_) => ValueKind::I16,
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::U8(_) => ValueKind::U8,
            Self::U16(_) => ValueKind::U16,
            Self::U32(_) => ValueKind::U32,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::Char(_) => ValueKind::Char,
            Self::String(_) => ValueKind::String,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Composite(_) => return None,
        })
    }

    /// The tag written next to this value on the wire.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Composite(composite) => composite.type_name(),
            scalar => scalar.kind().map(|kind| kind.tag()).unwrap_or_default(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Self::Composite(c) => Some(c),
            _ => None,
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for NodeValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
    DateTime<Utc> => Timestamp,
    Uuid => Uuid,
    Vec<u8> => Bytes,
    Composite => Composite,
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// A structured value: an application-registered type name plus ordered,
/// named fields.
///
/// Composites cannot be written natively by every wire format, so the data
/// codec encodes them to a string first and tags them with `type_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    type_name: String,
    fields: Vec<(String, NodeValue)>,
}

impl Composite {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Composite::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<NodeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[(String, NodeValue)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&NodeValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Set a field, replacing an existing one of the same name in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<NodeValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }
}
