#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod appearance;
pub mod byte_range;
mod cms;
pub mod digital_signer;
pub mod models;
pub mod pdf_signer;
mod pdf_string;
mod raster;
pub mod rectangle;
pub mod settings;
pub mod signature_checker;
pub mod signature_computer;
pub mod signature_embedder;
pub mod signing_document;
#[cfg(test)]
mod test_pdf;
pub mod visual_signer;
mod writer;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use byte_range::{ByteRange, PdfByteRanges};
pub use digital_signer::PdfDocumentDigitalSigner;
pub use models::{
    AddFieldParameters, PdfVerifySignaturesResult, SignDigitalParameters, SignFieldParameters,
    SignVisualParameters, SignatureDetails, SignatureField, SignatureParameters, SignatureText,
    VerifySignatureResult, VisualParameters,
};
pub use pdf_signer::{PdfSigner, PdfVisualSigner};
pub use rectangle::{Rectangle, Size};
pub use settings::{SignatureComputerSettings, SignatureSettings, SignerSettings};
pub use signature_checker::SignatureChecker;
pub use signature_computer::SignatureComputer;
pub use signature_embedder::SignatureEmbedder;
pub use signing_document::SigningDocument;
pub use visual_signer::PdfDocumentVisualSigner;

#[derive(Error, Debug)]
pub enum Error {
    #[error("PDF parsing error: {0}")]
    Parsing(#[from] lopdf::Error),
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ASN.1 error: {0}")]
    Asn1(#[from] der::Error),
    #[error("no signature placeholder found")]
    NoPlaceholder,
    #[error("signature '{0}' is already signed")]
    AlreadySigned(String),
    #[error("document is digitally signed")]
    DigitallySigned,
    #[error("signature '{0}' not found")]
    SignatureNotFound(String),
    #[error("invalid image")]
    InvalidImage,
    #[error("not enough space to store signature")]
    TooSmallPlaceholder,
    #[error("not enough space to store range")]
    TooSmallRange,
    #[error("signature contents not found in the incremental update")]
    MissingContents,
    #[error("invalid signature range")]
    InvalidRange,
    #[error("page {0} not found")]
    PageNotFound(usize),
    #[error("encrypted documents are not supported")]
    EncryptedDocument,
    #[error("startxref not found in the original document")]
    MissingStartXref,
    #[error("invalid \"certBags\"")]
    MissingCertificateBag,
    #[error("invalid \"keyBags\"")]
    MissingKeyBag,
    #[error("failed to find a certificate that matches the private key")]
    NoMatchingCertificate,
    #[error("only RSA signing keys are supported")]
    UnsupportedKey,
    #[error("invalid PKCS #7 signature")]
    InvalidPkcs7,
    #[error("unsupported digest algorithm")]
    UnsupportedDigestAlgorithm,
    #[error("invalid signature settings: {0}")]
    InvalidSettings(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Produces the detached PKCS #7 signature embedded into a placeholder.
///
/// [`SignatureComputer`] is the OpenSSL backed implementation. The signed
/// data is the concatenation of the two byte ranges declared in the
/// signature's `/ByteRange`.
pub trait Pkcs7Signer {
    fn compute_signature(&self, data: &[u8], signing_time: DateTime<Utc>) -> Result<Vec<u8>>;
}

impl<T: Pkcs7Signer + ?Sized> Pkcs7Signer for &T {
    fn compute_signature(&self, data: &[u8], signing_time: DateTime<Utc>) -> Result<Vec<u8>> {
        (**self).compute_signature(data, signing_time)
    }
}

pub(crate) struct ExactArrayOrNone<T, const N: usize>(pub(crate) Option<[T; N]>);

impl<T, const N: usize> FromIterator<T> for ExactArrayOrNone<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut iter = iter.into_iter();
        let result = array_init::from_iter(&mut iter);
        let result = if iter.next().is_none() { result } else { None };
        ExactArrayOrNone(result)
    }
}
