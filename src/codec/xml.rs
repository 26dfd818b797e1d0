//! Markup encoding.
//!
//! ```xml
//! <structure>
//!   <node path="" location="local" purpose="User"/>
//!   <node path="profile.rank" location="server"/>
//! </structure>
//!
//! <data>
//!   <record path="profile.rank" type="u8"><value>3</value></record>
//! </data>
//! ```
//!
//! Documents are written without indentation. Every value arrives as text.

use std::io::Cursor;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{CodecError, Format, RawValue, StructureRecord, WireCodec, WireRecord};
use crate::model::StorageLocation;

pub(super) struct XmlCodec;

const STRUCTURE: &str = "structure";
const NODE: &str = "node";
const DATA: &str = "data";
const RECORD: &str = "record";
const VALUE: &str = "value";

impl WireCodec for XmlCodec {
    fn format(&self) -> Format {
        Format::Xml
    }

    fn write_structure(&self, records: &[StructureRecord]) -> Result<Vec<u8>, CodecError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write(&mut writer, Event::Start(BytesStart::new(STRUCTURE)))?;
        for record in records {
            let mut node = BytesStart::new(NODE);
            push_attr(&mut node, "path", &record.path);
            if let Some(location) = record.location {
                push_attr(&mut node, "location", location.as_str());
            }
            if let Some(purpose) = &record.purpose {
                push_attr(&mut node, "purpose", purpose);
            }
            write(&mut writer, Event::Empty(node))?;
        }
        write(&mut writer, Event::End(BytesEnd::new(STRUCTURE)))?;
        Ok(writer.into_inner().into_inner())
    }

    fn read_structure(&self, payload: &[u8]) -> Result<Vec<StructureRecord>, CodecError> {
        let mut reader = Reader::from_str(std::str::from_utf8(payload)?);
        let mut records = Vec::new();
        loop {
            match reader.read_event().map_err(CodecError::xml)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == NODE.as_bytes() => {
                    let mut record = StructureRecord {
                        path: String::new(),
                        location: None,
                        purpose: None,
                    };
                    for (key, value) in attributes(&e)? {
                        match key.as_str() {
                            "path" => record.path = value,
                            "location" => {
                                record.location =
                                    Some(value.parse::<StorageLocation>().map_err(CodecError::xml)?)
                            }
                            "purpose" => record.purpose = Some(value),
                            _ => {}
                        }
                    }
                    records.push(record);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(records)
    }

    fn write_data(&self, records: &[WireRecord]) -> Result<Vec<u8>, CodecError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write(&mut writer, Event::Start(BytesStart::new(DATA)))?;
        for record in records {
            let mut start = BytesStart::new(RECORD);
            push_attr(&mut start, "path", &record.path);
            push_attr(&mut start, "type", &record.type_tag);
            write(&mut writer, Event::Start(start))?;
            if let Some(text) = record.value.to_text() {
                write(&mut writer, Event::Start(BytesStart::new(VALUE)))?;
                let escaped = escape(&text);
                write(&mut writer, Event::Text(BytesText::from_escaped(escaped)))?;
                write(&mut writer, Event::End(BytesEnd::new(VALUE)))?;
            }
            write(&mut writer, Event::End(BytesEnd::new(RECORD)))?;
        }
        write(&mut writer, Event::End(BytesEnd::new(DATA)))?;
        Ok(writer.into_inner().into_inner())
    }

    fn read_data(&self, payload: &[u8]) -> Result<Vec<WireRecord>, CodecError> {
        let mut reader = Reader::from_str(std::str::from_utf8(payload)?);
        let mut records = Vec::new();
        let mut current: Option<WireRecord> = None;
        let mut in_value = false;

        loop {
            match reader.read_event().map_err(CodecError::xml)? {
                Event::Start(e) if e.name().as_ref() == RECORD.as_bytes() => {
                    current = Some(record_from(&e)?);
                }
                Event::Empty(e) if e.name().as_ref() == RECORD.as_bytes() => {
                    records.push(record_from(&e)?);
                }
                Event::Start(e) if e.name().as_ref() == VALUE.as_bytes() => {
                    in_value = true;
                    if let Some(record) = current.as_mut() {
                        record.value = RawValue::Text(String::new());
                    }
                }
                Event::Empty(e) if e.name().as_ref() == VALUE.as_bytes() => {
                    if let Some(record) = current.as_mut() {
                        record.value = RawValue::Text(String::new());
                    }
                }
                Event::Text(t) if in_value => {
                    let text = t.unescape().map_err(CodecError::xml)?;
                    append_text(current.as_mut(), &text);
                }
                Event::CData(t) if in_value => {
                    let text = std::str::from_utf8(&t)?.to_string();
                    append_text(current.as_mut(), &text);
                }
                Event::End(e) if e.name().as_ref() == VALUE.as_bytes() => in_value = false,
                Event::End(e) if e.name().as_ref() == RECORD.as_bytes() => {
                    records.extend(current.take());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(records)
    }
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), CodecError> {
    writer.write_event(event).map_err(CodecError::xml)
}

/// Escape markup plus the whitespace characters a parser would normalise.
fn escape(raw: &str) -> String {
    quick_xml::escape::escape(raw)
        .replace('\r', "&#13;")
        .replace('\n', "&#10;")
        .replace('\t', "&#9;")
}

fn push_attr(start: &mut BytesStart<'_>, key: &str, value: &str) {
    let escaped = escape(value);
    start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
}

fn attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, CodecError> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(CodecError::xml)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(CodecError::xml)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn record_from(start: &BytesStart<'_>) -> Result<WireRecord, CodecError> {
    let mut record = WireRecord {
        path: String::new(),
        type_tag: String::new(),
        value: RawValue::Null,
    };
    for (key, value) in attributes(start)? {
        match key.as_str() {
            "path" => record.path = value,
            "type" => record.type_tag = value,
            _ => {}
        }
    }
    Ok(record)
}

fn append_text(record: Option<&mut WireRecord>, text: &str) {
    if let Some(WireRecord {
        value: RawValue::Text(buffer),
        ..
    }) = record
    {
        buffer.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_document_shape() {
        let records = vec![
            StructureRecord {
                path: String::new(),
                location: Some(StorageLocation::Local),
                purpose: Some("User".to_string()),
            },
            StructureRecord {
                path: "profile.rank".to_string(),
                location: Some(StorageLocation::Server),
                purpose: None,
            },
        ];
        let payload = XmlCodec.write_structure(&records).unwrap();
        assert_eq!(
            String::from_utf8(payload.clone()).unwrap(),
            r#"<structure><node path="" location="local" purpose="User"/><node path="profile.rank" location="server"/></structure>"#
        );
        assert_eq!(XmlCodec.read_structure(&payload).unwrap(), records);
    }

    #[test]
    fn data_text_survives_markup_and_whitespace() {
        let records = vec![
            WireRecord {
                path: "note".to_string(),
                type_tag: "string".to_string(),
                value: RawValue::Text("  <b>&\"x\"\r\n\tend ".to_string()),
            },
            WireRecord {
                path: "empty".to_string(),
                type_tag: "string".to_string(),
                value: RawValue::Text(String::new()),
            },
            WireRecord {
                path: "missing".to_string(),
                type_tag: "i32".to_string(),
                value: RawValue::Null,
            },
        ];
        let payload = XmlCodec.write_data(&records).unwrap();
        assert_eq!(XmlCodec.read_data(&payload).unwrap(), records);
    }

    #[test]
    fn numbers_arrive_as_text() {
        let records = vec![WireRecord {
            path: "rank".to_string(),
            type_tag: "u8".to_string(),
            value: RawValue::UInt(3),
        }];
        let payload = XmlCodec.write_data(&records).unwrap();
        let decoded = XmlCodec.read_data(&payload).unwrap();
        assert_eq!(decoded[0].value, RawValue::Text("3".to_string()));
    }
}
