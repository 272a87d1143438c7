//! Parameters and results of the signing operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rectangle::Rectangle;

/// Optional metadata stored in the signature dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Written to `/M` and used as the signing time. Signing uses the
    /// current time when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
}

/// Metadata read back from a signature dictionary.
pub type SignatureDetails = SignatureParameters;

/// A block of text lines drawn in a signature appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureText {
    pub lines: Vec<String>,
}

impl SignatureText {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// Appearance of a digital signature.
///
/// The appearance shows a JPEG or PNG background, two lines of the first
/// text block and four lines of the second one. `rectangle` places a new
/// field on its page and is ignored when signing an existing field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualParameters {
    pub rectangle: Option<Rectangle>,
    pub background: Option<Vec<u8>>,
    pub texts: Option<Vec<SignatureText>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignDigitalParameters {
    /// 1-based.
    pub page_number: usize,
    /// Field name, `Signature{n}` when absent.
    pub name: Option<String>,
    pub signature: Option<SignatureParameters>,
    pub visual: Option<VisualParameters>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddFieldParameters {
    pub page_number: usize,
    pub name: Option<String>,
    pub rectangle: Option<Rectangle>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignFieldParameters {
    pub field_name: String,
    pub signature: Option<SignatureParameters>,
    pub visual: Option<VisualParameters>,
}

/// A visual signature drawn straight into the page content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignVisualParameters {
    pub page_number: usize,
    pub rectangle: Rectangle,
    /// Flips the page vertically before drawing.
    pub reverse_y: bool,
    pub background: Option<Vec<u8>>,
    pub texts: Option<Vec<SignatureText>>,
    /// Resource name of the background image.
    pub background_name: Option<String>,
}

/// An unsigned signature field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureField {
    pub name: String,
    pub page_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum VerifySignatureResult {
    /// A field without a signature value.
    Field {
        name: String,
        #[serde(rename = "isField")]
        is_field: bool,
    },
    Signature {
        name: String,
        integrity: bool,
        details: SignatureDetails,
    },
}

impl VerifySignatureResult {
    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. } | Self::Signature { name, .. } => name,
        }
    }

    /// `None` for unsigned fields.
    pub fn integrity(&self) -> Option<bool> {
        match self {
            Self::Field { .. } => None,
            Self::Signature { integrity, .. } => Some(*integrity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfVerifySignaturesResult {
    pub integrity: bool,
    pub signatures: Vec<VerifySignatureResult>,
}
