//! Serialization of incremental updates.
//!
//! The original bytes are never touched: changed and new objects are written
//! after them, followed by a cross-reference section chained to the previous
//! one through `/Prev`.

use std::collections::BTreeMap;
use std::io::Write;

use lazy_static::lazy_static;
use lopdf::{Dictionary, Object, ObjectId, StringFormat};
use regex::bytes::Regex;

use crate::{Error, Result};

lazy_static! {
    static ref STARTXREF_REGEX: Regex = Regex::new(r"(?-u)startxref\s+(\d+)").unwrap();
}

/// Trailer keys carried over from the previous trailer.
const TRAILER_KEYS: [&[u8]; 3] = [b"Root", b"Info", b"ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XrefFormat {
    Table,
    Stream,
}

/// Offset of the last cross-reference section of `pdf`.
pub(crate) fn find_startxref(pdf: &[u8]) -> Option<usize> {
    let captures = STARTXREF_REGEX.captures_iter(pdf).last()?;
    std::str::from_utf8(captures.get(1)?.as_bytes())
        .ok()?
        .parse()
        .ok()
}

pub(crate) fn detect_xref_format(pdf: &[u8], offset: usize) -> XrefFormat {
    let section = pdf.get(offset..).unwrap_or_default();
    let start = section
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(section.len());
    if section[start..].starts_with(b"xref") {
        XrefFormat::Table
    } else {
        XrefFormat::Stream
    }
}

pub(crate) struct IncrementalWriter<'a> {
    original: &'a [u8],
    buffer: Vec<u8>,
    offsets: BTreeMap<u32, (u16, usize)>,
}

impl<'a> IncrementalWriter<'a> {
    pub(crate) fn new(original: &'a [u8]) -> Self {
        let mut buffer = Vec::new();
        if !matches!(original.last(), Some(b'\n' | b'\r')) {
            buffer.push(b'\n');
        }
        Self {
            original,
            buffer,
            offsets: BTreeMap::new(),
        }
    }

    fn position(&self) -> usize {
        self.original.len() + self.buffer.len()
    }

    pub(crate) fn write_indirect(&mut self, (number, generation): ObjectId, object: &Object) {
        self.offsets.insert(number, (generation, self.position()));
        write_indirect_object(&mut self.buffer, (number, generation), object);
    }

    /// Appends the cross-reference section and trailer, and returns the
    /// incremental bytes only.
    ///
    /// `next_id` is the first unused object number of the document.
    pub(crate) fn finish(mut self, previous_trailer: &Dictionary, next_id: u32) -> Result<Vec<u8>> {
        let prev = find_startxref(self.original).ok_or(Error::MissingStartXref)?;

        let mut trailer = Dictionary::new();
        for key in TRAILER_KEYS {
            if let Ok(value) = previous_trailer.get(key) {
                trailer.set(key, value.clone());
            }
        }
        trailer.set("Prev", Object::Integer(prev as i64));

        let xref_start = match detect_xref_format(self.original, prev) {
            XrefFormat::Table => {
                trailer.set("Size", Object::Integer(next_id as i64));
                let xref_start = self.position();
                self.write_xref_table(&trailer);
                xref_start
            }
            XrefFormat::Stream => {
                trailer.set("Size", Object::Integer(next_id as i64 + 1));
                let xref_start = self.position();
                self.write_xref_stream(trailer, next_id);
                xref_start
            }
        };

        write!(self.buffer, "startxref\n{xref_start}\n%%EOF\n")?;
        Ok(self.buffer)
    }

    fn write_xref_table(&mut self, trailer: &Dictionary) {
        self.buffer.extend_from_slice(b"xref\n");
        for (first, entries) in subsections(&self.offsets) {
            self.buffer
                .extend_from_slice(format!("{first} {}\n", entries.len()).as_bytes());
            for (generation, offset) in entries {
                self.buffer
                    .extend_from_slice(format!("{offset:010} {generation:05} n\r\n").as_bytes());
            }
        }
        self.buffer.extend_from_slice(b"trailer\n");
        write_dictionary(&mut self.buffer, trailer);
        self.buffer.push(b'\n');
    }

    fn write_xref_stream(&mut self, mut dict: Dictionary, id: u32) {
        self.offsets.insert(id, (0, self.position()));

        let max_offset = self.offsets.values().map(|&(_, o)| o).max().unwrap_or(0);
        let offset_width: usize = if max_offset <= u32::MAX as usize { 4 } else { 8 };

        let mut index = Vec::new();
        let mut content = Vec::new();
        for (first, entries) in subsections(&self.offsets) {
            index.push(Object::Integer(first as i64));
            index.push(Object::Integer(entries.len() as i64));
            for (generation, offset) in entries {
                content.push(1);
                content.extend_from_slice(&(offset as u64).to_be_bytes()[8 - offset_width..]);
                content.extend_from_slice(&generation.to_be_bytes());
            }
        }

        dict.set("Type", Object::Name(b"XRef".to_vec()));
        dict.set("Index", Object::Array(index));
        dict.set(
            "W",
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ]),
        );
        let stream = lopdf::Stream::new(dict, content);
        write_indirect_object(&mut self.buffer, (id, 0), &Object::Stream(stream));
    }
}

/// Groups the entries in runs of consecutive object numbers.
fn subsections(offsets: &BTreeMap<u32, (u16, usize)>) -> Vec<(u32, Vec<(u16, usize)>)> {
    let mut sections: Vec<(u32, Vec<(u16, usize)>)> = Vec::new();
    for (&number, &entry) in offsets {
        match sections.last_mut() {
            Some((first, entries)) if *first + entries.len() as u32 == number => entries.push(entry),
            _ => sections.push((number, vec![entry])),
        }
    }
    sections
}

fn write_indirect_object(out: &mut Vec<u8>, (number, generation): ObjectId, object: &Object) {
    out.extend_from_slice(format!("{number} {generation} obj\n").as_bytes());
    write_object(out, object);
    out.extend_from_slice(b"\nendobj\n");
}

pub(crate) fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(value) => out.extend_from_slice(if *value { &b"true"[..] } else { b"false" }),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => write_real(out, *value),
        Object::Name(name) => write_name(out, name),
        Object::String(bytes, StringFormat::Literal) => write_literal_string(out, bytes),
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode_upper(bytes).as_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict),
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", Object::Integer(stream.content.len() as i64));
            write_dictionary(out, &dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference((number, generation)) => {
            out.extend_from_slice(format!("{number} {generation} R").as_bytes())
        }
    }
}

fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    out.extend_from_slice(b" >>");
}

fn write_real(out: &mut Vec<u8>, value: f32) {
    let value = if value.is_finite() { value } else { 0.0 };
    out.extend_from_slice(value.to_string().as_bytes());
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &b in name {
        let regular = b.is_ascii_graphic()
            && !matches!(
                b,
                b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
            );
        if regular {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}
