//! Binary snapshots: a four-byte magic followed by a bincode body.
//!
//! Nested composite payloads are binary too, so they are boxed as base64
//! text before being embedded.

use base64::Engine;

use super::{CodecError, Format, StructureRecord, WireCodec, WireRecord};
use crate::model::StorageLocation;

pub(super) struct BinaryCodec;

const STRUCTURE_MAGIC: &[u8; 4] = b"MTS1";
const DATA_MAGIC: &[u8; 4] = b"MTD1";

/// Structure records without serde's skip attributes, which a
/// non-self-describing format cannot tolerate.
type PackedStructure = (String, Option<StorageLocation>, Option<String>);

impl WireCodec for BinaryCodec {
    fn format(&self) -> Format {
        Format::Binary
    }

    fn write_structure(&self, records: &[StructureRecord]) -> Result<Vec<u8>, CodecError> {
        let packed: Vec<PackedStructure> = records
            .iter()
            .map(|r| (r.path.clone(), r.location, r.purpose.clone()))
            .collect();
        Ok(framed(STRUCTURE_MAGIC, bincode::serialize(&packed)?))
    }

    fn read_structure(&self, payload: &[u8]) -> Result<Vec<StructureRecord>, CodecError> {
        let packed: Vec<PackedStructure> = bincode::deserialize(unframe(STRUCTURE_MAGIC, payload)?)?;
        Ok(packed
            .into_iter()
            .map(|(path, location, purpose)| StructureRecord {
                path,
                location,
                purpose,
            })
            .collect())
    }

    fn write_data(&self, records: &[WireRecord]) -> Result<Vec<u8>, CodecError> {
        Ok(framed(DATA_MAGIC, bincode::serialize(records)?))
    }

    fn read_data(&self, payload: &[u8]) -> Result<Vec<WireRecord>, CodecError> {
        Ok(bincode::deserialize(unframe(DATA_MAGIC, payload)?)?)
    }

    fn box_payload(&self, payload: Vec<u8>) -> Result<String, CodecError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(payload))
    }

    fn unbox_payload(&self, boxed: &str) -> Result<Vec<u8>, CodecError> {
        Ok(base64::engine::general_purpose::STANDARD.decode(boxed)?)
    }
}

fn framed(magic: &[u8; 4], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(magic.len() + body.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&body);
    out
}

fn unframe<'a>(magic: &[u8; 4], payload: &'a [u8]) -> Result<&'a [u8], CodecError> {
    payload.strip_prefix(magic.as_slice()).ok_or(CodecError::BadHeader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawValue;

    #[test]
    fn data_keeps_native_shapes() {
        let records = vec![
            WireRecord {
                path: "blob".to_string(),
                type_tag: "bytes".to_string(),
                value: RawValue::Bytes(vec![0, 1, 255]),
            },
            WireRecord {
                path: "score".to_string(),
                type_tag: "i16".to_string(),
                value: RawValue::Int(-300),
            },
        ];
        let payload = BinaryCodec.write_data(&records).unwrap();
        assert!(payload.starts_with(DATA_MAGIC));
        assert_eq!(BinaryCodec.read_data(&payload).unwrap(), records);
    }

    #[test]
    fn structure_payload_is_not_data() {
        let payload = BinaryCodec.write_structure(&[]).unwrap();
        assert!(matches!(
            BinaryCodec.read_data(&payload),
            Err(CodecError::BadHeader)
        ));
    }
}
