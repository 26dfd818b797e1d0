//! Dotted path encoding.
//!
//! A path joins node names with `.`. Names that themselves contain `.` or
//! `\` are escaped with a backslash so that every path splits back into the
//! exact segments it was built from.

use std::borrow::Cow;

pub const SEPARATOR: char = '.';
const ESCAPE: char = '\\';

/// Escape a single node name for use as a path segment.
pub fn escape_segment(name: &str) -> Cow<'_, str> {
    if !name.contains([SEPARATOR, ESCAPE]) {
        return Cow::Borrowed(name);
    }
    let mut escaped = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if c == SEPARATOR || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Join raw names into an escaped path.
pub fn join<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for (i, name) in names.into_iter().enumerate() {
        if i > 0 {
            path.push(SEPARATOR);
        }
        path.push_str(&escape_segment(name));
    }
    path
}

/// Split an escaped path into raw names. The empty path has no segments.
pub fn split(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                // A trailing lone escape is kept literally.
                current.push(chars.next().unwrap_or(ESCAPE));
            }
            SEPARATOR => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}
