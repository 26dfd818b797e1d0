use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{
    CodecError, CompositeType, Format, RawValue, TypeDescriptor, TypeRegistry, WireCodec,
    WireRecord,
};
use crate::model::{Composite, LocationSet, ModelTree, NodeId, NodeValue, ValueKind};

/// Why a single data record was dropped during loading.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("type `{0}` is not registered")]
    UnregisteredType(String),

    #[error("cannot convert {from} value to `{to}`")]
    Coercion { from: &'static str, to: String },

    #[error("composite `{type_name}` is missing field `{field}`")]
    MissingField { type_name: String, field: String },

    #[error("composite payload could not be decoded: {0}")]
    Payload(#[from] CodecError),
}

/// A record dropped during loading, with the reason.
#[derive(Debug)]
pub struct SkippedRecord {
    pub path: String,
    pub type_tag: String,
    pub error: RecordError,
}

/// A record whose value has been reconciled to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub path: String,
    pub value: NodeValue,
}

/// Outcome of loading a data payload onto a tree.
///
/// Loading never fails on individual records; callers that need every value
/// check [`DataReport::is_complete`] or inspect the lists.
#[derive(Debug, Default)]
pub struct DataReport {
    /// Nodes that received a value.
    pub applied: usize,
    /// Records dropped before reaching the tree.
    pub skipped: Vec<SkippedRecord>,
    /// Paths of reconciled records that matched no visited node.
    pub unmatched: Vec<String>,
}

impl DataReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.unmatched.is_empty()
    }
}

// ============================================================
// Encoding
// ============================================================

/// Serialize the values of `start`'s subtree as flattened records.
///
/// Nodes are visited in pre-order; nodes without a value are left out.
/// `Game` nodes contribute whatever their lookup returns.
pub fn serialize_data(
    tree: &ModelTree,
    start: NodeId,
    filter: LocationSet,
    format: Format,
) -> Result<Vec<u8>, CodecError> {
    let codec = format.codec();
    let mut records = Vec::new();
    for id in tree.prefix(start, filter) {
        let Some(value) = tree.value(id) else {
            continue;
        };
        records.push(WireRecord {
            path: tree.path(id).unwrap_or_default(),
            type_tag: value.type_tag().to_string(),
            value: encode_value(&value, codec)?,
        });
    }
    codec.write_data(&records)
}

/// Lower a value to its wire shape. Composites are written with `codec`
/// and boxed as text.
pub fn encode_value(value: &NodeValue, codec: &dyn WireCodec) -> Result<RawValue, CodecError> {
    Ok(match value {
        NodeValue::Bool(b) => RawValue::Bool(*b),
        NodeValue::I8(v) => RawValue::Int(i64::from(*v)),
        NodeValue::I16(v) => RawValue::Int(i64::from(*v)),
        NodeValue::I32(v) => RawValue::Int(i64::from(*v)),
        NodeValue::I64(v) => RawValue::Int(*v),
        NodeValue::U8(v) => RawValue::UInt(u64::from(*v)),
        NodeValue::U16(v) => RawValue::UInt(u64::from(*v)),
        NodeValue::U32(v) => RawValue::UInt(u64::from(*v)),
        NodeValue::U64(v) => RawValue::UInt(*v),
        NodeValue::F32(v) => RawValue::Float(f64::from(*v)),
        NodeValue::F64(v) => RawValue::Float(*v),
        NodeValue::Char(c) => RawValue::Text(c.to_string()),
        NodeValue::String(s) => RawValue::Text(s.clone()),
        NodeValue::Timestamp(t) => RawValue::Text(t.to_rfc3339()),
        NodeValue::Uuid(u) => RawValue::Text(u.to_string()),
        NodeValue::Bytes(b) => RawValue::Bytes(b.clone()),
        NodeValue::Composite(c) => RawValue::Text(encode_composite(c, codec)?),
    })
}

/// First pass of the two-pass encode: the composite's fields become data
/// records (field name as path) in the same format, then a string.
fn encode_composite(composite: &Composite, codec: &dyn WireCodec) -> Result<String, CodecError> {
    let records = composite
        .fields()
        .iter()
        .map(|(name, value)| {
            Ok(WireRecord {
                path: name.clone(),
                type_tag: value.type_tag().to_string(),
                value: encode_value(value, codec)?,
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;
    codec.box_payload(codec.write_data(&records)?)
}

// ============================================================
// Decoding
// ============================================================

/// Parse a data payload and reconcile every record against `types`.
///
/// Only a payload that cannot be parsed at all is an error. Records with an
/// unregistered tag or an unconvertible value come back in the skipped list.
pub fn decode_data(
    payload: &[u8],
    format: Format,
    types: &TypeRegistry,
) -> Result<(Vec<DecodedRecord>, Vec<SkippedRecord>), CodecError> {
    let codec = format.codec();
    let mut decoded = Vec::new();
    let mut skipped = Vec::new();

    for record in codec.read_data(payload)? {
        match reconcile(record.value, &record.type_tag, types, codec) {
            Ok(value) => decoded.push(DecodedRecord {
                path: record.path,
                value,
            }),
            Err(error) => {
                tracing::warn!(
                    path = %record.path,
                    type_tag = %record.type_tag,
                    error = %error,
                    "skipping data record"
                );
                skipped.push(SkippedRecord {
                    path: record.path,
                    type_tag: record.type_tag,
                    error,
                });
            }
        }
    }
    Ok((decoded, skipped))
}

/// Load a data payload onto `start`'s subtree.
pub fn deserialize_data(
    tree: &mut ModelTree,
    start: NodeId,
    filter: LocationSet,
    payload: &[u8],
    format: Format,
    types: &TypeRegistry,
) -> Result<DataReport, CodecError> {
    let (decoded, skipped) = decode_data(payload, format, types)?;
    let mut report = apply_data(tree, start, filter, decoded);
    report.skipped = skipped;
    Ok(report)
}

/// Assign reconciled records to nodes.
///
/// The subtree is walked in pre-order and every visited node whose path
/// equals a record's path receives that record's value. When a payload
/// repeats a path, the first record wins. Nodes without a record keep their
/// current value.
pub fn apply_data(
    tree: &mut ModelTree,
    start: NodeId,
    filter: LocationSet,
    records: Vec<DecodedRecord>,
) -> DataReport {
    let mut order = Vec::with_capacity(records.len());
    let mut by_path: HashMap<String, NodeValue> = HashMap::with_capacity(records.len());
    for record in records {
        if !by_path.contains_key(&record.path) {
            order.push(record.path.clone());
            by_path.insert(record.path, record.value);
        }
    }

    let targets: Vec<(NodeId, String)> = tree
        .prefix(start, filter)
        .filter_map(|id| tree.path(id).map(|path| (id, path)))
        .collect();

    let mut report = DataReport::default();
    let mut matched = HashSet::new();
    for (id, path) in targets {
        let Some(value) = by_path.get(&path) else {
            continue;
        };
        if tree.set_value(id, Some(value.clone())) {
            report.applied += 1;
        }
        matched.insert(path);
    }
    report.unmatched = order
        .into_iter()
        .filter(|path| !matched.contains(path))
        .collect();
    report
}

// ============================================================
// Reconciliation
// ============================================================

/// Convert a wire value to the type its tag declares.
///
/// Composites arrive boxed as text and are decoded with the same codec they
/// were written with; scalars go through a generic conversion that narrows
/// widened numbers and parses text.
pub fn reconcile(
    raw: RawValue,
    type_tag: &str,
    types: &TypeRegistry,
    codec: &dyn WireCodec,
) -> Result<NodeValue, RecordError> {
    match types.get(type_tag) {
        None => Err(RecordError::UnregisteredType(type_tag.to_string())),
        Some(TypeDescriptor::Scalar(kind)) => coerce(raw, *kind),
        Some(TypeDescriptor::Composite(schema)) => match raw {
            RawValue::Text(boxed) => decode_composite(&boxed, schema, types, codec),
            other => Err(RecordError::Coercion {
                from: other.shape(),
                to: schema.name().to_string(),
            }),
        },
    }
}

fn decode_composite(
    boxed: &str,
    schema: &CompositeType,
    types: &TypeRegistry,
    codec: &dyn WireCodec,
) -> Result<NodeValue, RecordError> {
    let payload = codec.unbox_payload(boxed)?;
    let mut fields = codec.read_data(&payload)?;

    let mut composite = Composite::new(schema.name());
    for field in schema.fields() {
        let position = fields
            .iter()
            .position(|record| record.path == field.name)
            .ok_or_else(|| RecordError::MissingField {
                type_name: schema.name().to_string(),
                field: field.name.clone(),
            })?;
        let record = fields.swap_remove(position);
        let value = reconcile(record.value, &field.type_tag, types, codec)?;
        composite.set(field.name.clone(), value);
    }
    for extra in &fields {
        tracing::debug!(type_name = schema.name(), field = %extra.path, "ignoring undeclared field");
    }
    Ok(NodeValue::Composite(composite))
}

fn coerce(raw: RawValue, kind: ValueKind) -> Result<NodeValue, RecordError> {
    let shape = raw.shape();
    let converted = match kind {
        ValueKind::String => match raw {
            RawValue::Text(s) => Some(NodeValue::String(s)),
            RawValue::Null | RawValue::Bytes(_) => None,
            ref other => other.to_text().map(NodeValue::String),
        },
        ValueKind::Bytes => match raw {
            RawValue::Bytes(b) => Some(NodeValue::Bytes(b)),
            RawValue::Text(s) => base64::engine::general_purpose::STANDARD
                .decode(s.trim())
                .ok()
                .map(NodeValue::Bytes),
            _ => None,
        },
        ValueKind::Bool => boolean(&raw).map(NodeValue::Bool),
        ValueKind::I8 => integer(&raw).map(NodeValue::I8),
        ValueKind::I16 => integer(&raw).map(NodeValue::I16),
        ValueKind::I32 => integer(&raw).map(NodeValue::I32),
        ValueKind::I64 => integer(&raw).map(NodeValue::I64),
        ValueKind::U8 => integer(&raw).map(NodeValue::U8),
        ValueKind::U16 => integer(&raw).map(NodeValue::U16),
        ValueKind::U32 => integer(&raw).map(NodeValue::U32),
        ValueKind::U64 => integer(&raw).map(NodeValue::U64),
        ValueKind::F32 => float(&raw)
            .filter(|f| !f.is_finite() || f.abs() <= f64::from(f32::MAX))
            .map(|f| NodeValue::F32(f as f32)),
        ValueKind::F64 => float(&raw).map(NodeValue::F64),
        ValueKind::Char => text(&raw).and_then(single_char).map(NodeValue::Char),
        ValueKind::Timestamp => timestamp(&raw).map(NodeValue::Timestamp),
        ValueKind::Uuid => text(&raw)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(NodeValue::Uuid),
    };
    converted.ok_or_else(|| RecordError::Coercion {
        from: shape,
        to: kind.tag().to_string(),
    })
}

fn text(raw: &RawValue) -> Option<&str> {
    match raw {
        RawValue::Text(s) => Some(s),
        _ => None,
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn boolean(raw: &RawValue) -> Option<bool> {
    match raw {
        RawValue::Bool(b) => Some(*b),
        RawValue::Int(0) | RawValue::UInt(0) => Some(false),
        RawValue::Int(1) | RawValue::UInt(1) => Some(true),
        RawValue::Text(s) => match s.trim() {
            "true" | "True" | "1" => Some(true),
            "false" | "False" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Range-checked conversion to any integer width.
fn integer<T>(raw: &RawValue) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64> + FromStr,
{
    match raw {
        RawValue::Int(i) => <T as TryFrom<i64>>::try_from(*i).ok(),
        RawValue::UInt(u) => <T as TryFrom<u64>>::try_from(*u).ok(),
        RawValue::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => {
            <T as TryFrom<i64>>::try_from(*f as i64).ok()
        }
        RawValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Int(i) => Some(*i as f64),
        RawValue::UInt(u) => Some(*u as f64),
        RawValue::Float(f) => Some(*f),
        RawValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp(raw: &RawValue) -> Option<DateTime<Utc>> {
    match raw {
        RawValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        RawValue::Int(secs) => DateTime::from_timestamp(*secs, 0),
        _ => None,
    }
}
