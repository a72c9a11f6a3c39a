//! EXIF capture date for photos
//!
//! The date feeds the analysis prompt's season cues when the caller gives none.

use std::io::Cursor;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{Exif, In, Reader, Tag, Value};

/// Capture date from in-memory image bytes, `None` when they carry no usable EXIF
pub fn observation_date_from_bytes(bytes: &[u8]) -> Option<NaiveDate> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    capture_date(&exif)
}

fn capture_date(exif: &Exif) -> Option<NaiveDate> {
    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| match &field.value {
            Value::Ascii(values) => values
                .first()
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .and_then(parse_exif_datetime),
            _ => None,
        })
}

/// Parse EXIF datetime string (format: "2024:01:15 10:30:45")
fn parse_exif_datetime(s: &str) -> Option<NaiveDate> {
    // Remove quotes if present
    let s = s.trim().trim_matches('"');

    ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}
