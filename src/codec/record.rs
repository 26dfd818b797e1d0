use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::model::StorageLocation;

/// One node of a serialized shape.
///
/// A payload may open with a root header: an empty `path` plus the model
/// purpose and the root's location. Any other record with an empty path
/// names a root-level child called `""`. Other records carry a location
/// only when the node overrides its parent's policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<StorageLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl StructureRecord {
    pub fn is_root_header(&self) -> bool {
        self.path.is_empty() && self.purpose.is_some()
    }
}

/// One value of a serialized data payload, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub path: String,
    pub type_tag: String,
    pub value: RawValue,
}

/// A value as a wire format represents it.
///
/// Formats only distinguish a handful of shapes: integers arrive widened,
/// and text formats deliver everything as `Text`. Reconciliation against
/// the declared type tag restores the exact kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Textual rendering used by the markup and plain formats.
    pub(crate) fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::UInt(u) => Some(u.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(base64::engine::general_purpose::STANDARD.encode(b)),
        }
    }
}
