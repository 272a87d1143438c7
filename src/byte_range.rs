//! Byte range bookkeeping of detached signatures.
//!
//! A signed PDF is split in three contiguous spans: everything before the
//! `/Contents` hex string, the hex string itself (delimiters included), and
//! everything after it. Only the first and last spans are signed, and their
//! offsets are what the `/ByteRange` array declares.

use std::io::Write;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use serde::Serialize;

use crate::{Error, Result};

lazy_static! {
    static ref CONTENTS_REGEX: Regex =
        Regex::new(r"(?-u)/Contents\s*<([0-9A-Fa-f\s]*)>").unwrap();
    static ref BYTE_RANGE_REGEX: Regex = Regex::new(r"(?-u)/ByteRange\s*(\[[^\]]*\])").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: usize,
    pub length: usize,
}

impl ByteRange {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PdfByteRanges {
    pub before: ByteRange,
    pub signature: ByteRange,
    pub after: ByteRange,
}

impl PdfByteRanges {
    /// Computes the spans of the document made of `initial_len` original
    /// bytes followed by `incremental`, which must hold the signature
    /// dictionary being created.
    pub fn from_incremental(initial_len: usize, incremental: &[u8]) -> Result<Self> {
        let contents = locate_contents(incremental).ok_or(Error::MissingContents)?;
        let (start, end) = (contents.start, contents.end);

        Ok(Self {
            before: ByteRange {
                start: 0,
                length: initial_len + start - 1,
            },
            signature: ByteRange {
                start: initial_len + start - 1,
                length: end - start + 2,
            },
            after: ByteRange {
                start: initial_len + end + 1,
                length: incremental.len() - end - 1,
            },
        })
    }

    /// Derives the spans from the four integers of a `/ByteRange` array.
    ///
    /// The first span must start at the beginning of the file.
    pub fn from_byte_range([start1, length1, start2, length2]: [i64; 4]) -> Result<Self> {
        if start1 != 0 {
            return Err(Error::InvalidRange);
        }
        let to_usize = |v: i64| usize::try_from(v).map_err(|_| Error::InvalidRange);
        let (start1, length1) = (to_usize(start1)?, to_usize(length1)?);
        let (start2, length2) = (to_usize(start2)?, to_usize(length2)?);

        let signature_start = start1 + length1;
        if start2 < signature_start {
            return Err(Error::InvalidRange);
        }

        Ok(Self {
            before: ByteRange {
                start: start1,
                length: length1,
            },
            signature: ByteRange {
                start: signature_start,
                length: start2 - signature_start,
            },
            after: ByteRange {
                start: start2,
                length: length2,
            },
        })
    }

    /// The `/ByteRange` values: the signature span is excluded.
    pub fn byte_range_array(&self) -> [usize; 4] {
        [
            self.before.start,
            self.before.length,
            self.after.start,
            self.after.length,
        ]
    }

    pub fn total_length(&self) -> usize {
        self.before.length + self.signature.length + self.after.length
    }

    /// Concatenates the signed spans of `pdf`.
    pub fn sign_buffer(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        let before = pdf.get(self.before.as_range()).ok_or(Error::InvalidRange)?;
        let after = pdf.get(self.after.as_range()).ok_or(Error::InvalidRange)?;

        let mut buffer = Vec::with_capacity(before.len() + after.len());
        buffer.extend_from_slice(before);
        buffer.extend_from_slice(after);
        Ok(buffer)
    }
}

/// Finds the first `/Contents` hex string of `buf`.
///
/// Returns the range between the `<` and `>` delimiters. Indirect and array
/// `/Contents` values are skipped.
pub fn locate_contents(buf: &[u8]) -> Option<Range<usize>> {
    CONTENTS_REGEX
        .captures(buf)
        .and_then(|c| c.get(1))
        .map(|m| m.range())
}

/// Finds the first `/ByteRange` array of `buf`, brackets included.
pub fn locate_byte_range(buf: &[u8]) -> Option<Range<usize>> {
    BYTE_RANGE_REGEX
        .captures(buf)
        .and_then(|c| c.get(1))
        .map(|m| m.range())
}

/// Rewrites the `/ByteRange` placeholder of `incremental` in place.
///
/// The new array is written over the placeholder and padded with spaces to
/// its original width, so no offset moves. Returns `None` when `incremental`
/// has no `/ByteRange`.
pub fn update_byte_range(
    incremental: &mut [u8],
    initial_len: usize,
) -> Result<Option<PdfByteRanges>> {
    let Some(bracket) = locate_byte_range(incremental) else {
        return Ok(None);
    };

    let ranges = PdfByteRanges::from_incremental(initial_len, incremental)?;
    let [a, b, c, d] = ranges.byte_range_array();
    let array = format!("[{a} {b} {c} {d}]");
    if array.len() > bracket.len() {
        return Err(Error::TooSmallRange);
    }

    let mut slot = &mut incremental[bracket];
    slot.write_all(array.as_bytes())?;
    slot.fill(b' ');

    Ok(Some(ranges))
}
