//! Writes a computed signature into its reserved placeholder.

use log::debug;

use crate::byte_range::PdfByteRanges;
use crate::signing_document::SigningDocument;
use crate::{Error, Result};

/// A PDF whose signature placeholder is still unfilled.
///
/// Embedding overwrites the placeholder hex digits only, so the output has
/// the exact length of the input and the declared byte ranges stay valid.
pub struct SignatureEmbedder<'a> {
    pdf: &'a [u8],
    ranges: PdfByteRanges,
}

impl<'a> SignatureEmbedder<'a> {
    pub fn new(pdf: &'a [u8], ranges: PdfByteRanges) -> Self {
        Self { pdf, ranges }
    }

    /// Uses the ranges of the last signature field.
    pub fn from_pdf(pdf: &'a [u8]) -> Result<Self> {
        let ranges = SigningDocument::load(pdf)?.get_placeholder_ranges()?;
        Ok(Self::new(pdf, ranges))
    }

    /// Uses the ranges of the signature field named `name`.
    pub fn for_signature(pdf: &'a [u8], name: &str) -> Result<Self> {
        let doc = SigningDocument::load(pdf)?;
        let ranges = doc.get_signature_ranges(doc.get_signature(name)?)?;
        Ok(Self::new(pdf, ranges))
    }

    pub fn ranges(&self) -> &PdfByteRanges {
        &self.ranges
    }

    /// The bytes to be signed.
    pub fn sign_buffer(&self) -> Result<Vec<u8>> {
        self.ranges.sign_buffer(self.pdf)
    }

    pub fn embed_signature(&self, signature: &[u8]) -> Result<Vec<u8>> {
        self.embed_hex_signature(&hex::encode_upper(signature))
    }

    /// Embeds a hex encoded signature, padded with `0` up to the
    /// placeholder size.
    pub fn embed_hex_signature(&self, hex_signature: &str) -> Result<Vec<u8>> {
        let capacity = self
            .ranges
            .signature
            .length
            .checked_sub(2)
            .ok_or(Error::InvalidRange)?;
        if hex_signature.len() > capacity {
            return Err(Error::TooSmallPlaceholder);
        }

        // Both slices keep the delimiters of the hex string.
        let before = self
            .pdf
            .get(self.ranges.before.start..self.ranges.before.end() + 1)
            .ok_or(Error::InvalidRange)?;
        let after = self
            .ranges
            .after
            .start
            .checked_sub(1)
            .and_then(|start| self.pdf.get(start..))
            .ok_or(Error::InvalidRange)?;

        let mut signed = Vec::with_capacity(before.len() + capacity + after.len());
        signed.extend_from_slice(before);
        signed.extend_from_slice(hex_signature.as_bytes());
        signed.resize(signed.len() + capacity - hex_signature.len(), b'0');
        signed.extend_from_slice(after);

        debug!(
            "embedded a {} digit signature in a {capacity} digit placeholder",
            hex_signature.len()
        );
        Ok(signed)
    }
}
