//! Wire formats for model trees.
//!
//! A tree travels in two independent halves:
//!
//! - **structure**: the shape (paths and policies), see [`serialize_structure`]
//! - **data**: flattened `(path, value, type tag)` records, see
//!   [`serialize_data`]
//!
//! Each half can be written in any [`Format`]. Loading data reconciles the
//! loosely-typed wire values against a [`TypeRegistry`] before applying them.

mod binary;
mod data;
mod json;
mod plain;
mod record;
mod structure;
mod types;
mod xml;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use data::*;
pub use record::*;
pub use structure::*;
pub use types::*;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("binary snapshot error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("payload is not a binary snapshot")]
    BadHeader,

    #[error("plain format error on line {line}: {message}")]
    Plain { line: usize, message: String },

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl CodecError {
    pub(crate) fn xml(e: impl fmt::Display) -> Self {
        Self::Xml(e.to_string())
    }
}

/// Encodes and decodes record arrays in one wire format.
pub trait WireCodec {
    fn format(&self) -> Format;

    fn write_structure(&self, records: &[StructureRecord]) -> Result<Vec<u8>, CodecError>;

    fn read_structure(&self, payload: &[u8]) -> Result<Vec<StructureRecord>, CodecError>;

    fn write_data(&self, records: &[WireRecord]) -> Result<Vec<u8>, CodecError>;

    fn read_data(&self, payload: &[u8]) -> Result<Vec<WireRecord>, CodecError>;

    /// Turn an encoded payload into a string-typed value, so it can be
    /// nested inside another payload of the same format.
    fn box_payload(&self, payload: Vec<u8>) -> Result<String, CodecError> {
        String::from_utf8(payload).map_err(|e| CodecError::Utf8(e.utf8_error()))
    }

    fn unbox_payload(&self, boxed: &str) -> Result<Vec<u8>, CodecError> {
        Ok(boxed.as_bytes().to_vec())
    }
}

/// The supported wire formats.
///
/// - `Json`: self-describing array of objects
/// - `Xml`: markup document
/// - `Plain`: one tab-separated record per line
/// - `Binary`: bincode snapshot
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Json,
    Xml,
    Plain,
    Binary,
}

impl Format {
    pub const ALL: [Format; 4] = [Self::Json, Self::Xml, Self::Plain, Self::Binary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Plain => "plain",
            Self::Binary => "binary",
        }
    }

    /// File extension used for storage keys.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Plain => "txt",
            Self::Binary => "bin",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Plain => "text/plain; charset=utf-8",
            Self::Binary => "application/octet-stream",
        }
    }

    pub fn codec(&self) -> &'static dyn WireCodec {
        match self {
            Self::Json => &json::JsonCodec,
            Self::Xml => &xml::XmlCodec,
            Self::Plain => &plain::PlainCodec,
            Self::Binary => &binary::BinaryCodec,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "plain" | "txt" => Ok(Self::Plain),
            "binary" | "bin" => Ok(Self::Binary),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}
