//! Text strings and dates as PDF stores them.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use lopdf::{Object, StringFormat};
use regex::bytes::Regex;

lazy_static! {
    static ref DATE_REGEX: Regex = Regex::new(
        r"(?-u)^D:(\d{4})(\d{2})?(\d{2})?(\d{2})?(\d{2})?(\d{2})?(?:([Z+\-])(?:(\d{2})'?(?:(\d{2})'?)?)?)?"
    )
    .unwrap();
}

/// Encodes a text string: Latin-1 when possible, UTF-16BE with a byte order
/// mark otherwise.
pub(crate) fn encode_text_string(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) < 0xFF) {
        return text.chars().map(|c| c as u8).collect();
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

pub(crate) fn text_string(text: &str) -> Object {
    Object::String(encode_text_string(text), StringFormat::Literal)
}

pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Formats `date` as a PDF date string in UTC, with second resolution.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}

pub(crate) fn parse_date(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let captures = DATE_REGEX.captures(bytes)?;
    let field = |i: usize, default: u32| -> Option<u32> {
        match captures.get(i) {
            Some(m) => std::str::from_utf8(m.as_bytes()).ok()?.parse().ok(),
            None => Some(default),
        }
    };

    let year = field(1, 0)? as i32;
    let date = NaiveDate::from_ymd_opt(year, field(2, 1)?, field(3, 1)?)?;
    let time = date.and_hms_opt(field(4, 0)?, field(5, 0)?, field(6, 0)?)?;

    let offset_seconds = (field(8, 0)? * 3600 + field(9, 0)? * 60) as i32;
    let offset = match captures.get(7).map(|m| m.as_bytes()) {
        Some(b"-") => FixedOffset::west_opt(offset_seconds)?,
        Some(b"+") => FixedOffset::east_opt(offset_seconds)?,
        _ => FixedOffset::east_opt(0)?,
    };

    offset
        .from_local_datetime(&time)
        .single()
        .map(|d| d.with_timezone(&Utc))
}

/// Escapes `text` for a literal string inside a content stream shown with a
/// single byte encoding. Characters outside Latin-1 become `?`.
pub(crate) fn escape_content_text(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = u8::try_from(c as u32).unwrap_or(b'?');
        if matches!(byte, b'(' | b')' | b'\\') {
            bytes.push(b'\\');
        }
        bytes.push(byte);
    }
    bytes
}
