//! Line-oriented encoding: one record per line, fields separated by tabs.
//!
//! Structure lines are `path<TAB>location<TAB>purpose` with empty fields for
//! absent values. Data lines are `path<TAB>type<TAB>value`; a missing third
//! field means a null value. Backslash, tab, CR and LF inside a field are
//! escaped as `\\`, `\t`, `\r` and `\n`.

use super::{CodecError, Format, RawValue, StructureRecord, WireCodec, WireRecord};
use crate::model::StorageLocation;

pub(super) struct PlainCodec;

impl WireCodec for PlainCodec {
    fn format(&self) -> Format {
        Format::Plain
    }

    fn write_structure(&self, records: &[StructureRecord]) -> Result<Vec<u8>, CodecError> {
        let mut out = String::new();
        for record in records {
            let location = record.location.map(|l| l.as_str()).unwrap_or_default();
            let purpose = record.purpose.as_deref().unwrap_or_default();
            push_line(&mut out, &[record.path.as_str(), location, purpose]);
        }
        Ok(out.into_bytes())
    }

    fn read_structure(&self, payload: &[u8]) -> Result<Vec<StructureRecord>, CodecError> {
        lines(payload)?
            .map(|(line, fields)| {
                let [path, location, purpose] = fields.as_slice() else {
                    return Err(malformed(line, "expected 3 fields"));
                };
                let location = match location.as_str() {
                    "" => None,
                    name => Some(name.parse::<StorageLocation>().map_err(|e| CodecError::Plain {
                        line,
                        message: format!("{}", e),
                    })?),
                };
                Ok(StructureRecord {
                    path: path.clone(),
                    location,
                    purpose: Some(purpose.clone()).filter(|p| !p.is_empty()),
                })
            })
            .collect()
    }

    fn write_data(&self, records: &[WireRecord]) -> Result<Vec<u8>, CodecError> {
        let mut out = String::new();
        for record in records {
            match record.value.to_text() {
                Some(text) => push_line(
                    &mut out,
                    &[record.path.as_str(), record.type_tag.as_str(), text.as_str()],
                ),
                None => push_line(&mut out, &[record.path.as_str(), record.type_tag.as_str()]),
            }
        }
        Ok(out.into_bytes())
    }

    fn read_data(&self, payload: &[u8]) -> Result<Vec<WireRecord>, CodecError> {
        lines(payload)?
            .map(|(line, mut fields)| {
                let value = match fields.len() {
                    3 => fields.pop().map(RawValue::Text).unwrap_or(RawValue::Null),
                    2 => RawValue::Null,
                    _ => return Err(malformed(line, "expected 2 or 3 fields")),
                };
                let type_tag = fields.pop().unwrap_or_default();
                let path = fields.pop().unwrap_or_default();
                Ok(WireRecord {
                    path,
                    type_tag,
                    value,
                })
            })
            .collect()
    }
}

fn push_line(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        escape_into(out, field);
    }
    out.push('\n');
}

fn escape_into(out: &mut String, field: &str) {
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

fn unescape(line: usize, field: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(malformed(line, &format!("unknown escape \\{}", other))),
            None => return Err(malformed(line, "dangling escape")),
        }
    }
    Ok(out)
}

/// Non-empty lines, numbered from 1, split into unescaped fields.
fn lines(
    payload: &[u8],
) -> Result<impl Iterator<Item = (usize, Vec<String>)>, CodecError> {
    let text = std::str::from_utf8(payload)?;
    let parsed = text
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            let fields = line
                .split('\t')
                .map(|field| unescape(i + 1, field))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((i + 1, fields))
        })
        .collect::<Result<Vec<_>, CodecError>>()?;
    Ok(parsed.into_iter())
}

fn malformed(line: usize, message: &str) -> CodecError {
    CodecError::Plain {
        line,
        message: message.to_string(),
    }
}
