use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::{CodecError, Format, RawValue, StructureRecord, WireCodec, WireRecord};

pub(super) struct JsonCodec;

/// Data record as it appears in a JSON payload: `{"path", "value", "type"}`.
#[derive(Serialize, Deserialize)]
struct JsonRecord {
    path: String,
    value: Value,
    #[serde(rename = "type")]
    type_tag: String,
}

impl WireCodec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn write_structure(&self, records: &[StructureRecord]) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(records)?)
    }

    fn read_structure(&self, payload: &[u8]) -> Result<Vec<StructureRecord>, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn write_data(&self, records: &[WireRecord]) -> Result<Vec<u8>, CodecError> {
        let records: Vec<JsonRecord> = records
            .iter()
            .map(|record| JsonRecord {
                path: record.path.clone(),
                value: to_json(&record.value),
                type_tag: record.type_tag.clone(),
            })
            .collect();
        Ok(serde_json::to_vec(&records)?)
    }

    fn read_data(&self, payload: &[u8]) -> Result<Vec<WireRecord>, CodecError> {
        let records: Vec<JsonRecord> = serde_json::from_slice(payload)?;
        Ok(records
            .into_iter()
            .map(|record| WireRecord {
                path: record.path,
                type_tag: record.type_tag,
                value: from_json(record.value),
            })
            .collect())
    }
}

fn to_json(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::from(*i),
        RawValue::UInt(u) => Value::from(*u),
        // JSON has no NaN or infinities; those travel as strings.
        RawValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        RawValue::Text(s) => Value::String(s.clone()),
        RawValue::Bytes(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}

fn from_json(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                RawValue::UInt(u)
            } else {
                RawValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => RawValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}
