//! Integrity checks of the signatures of a document.
//!
//! A signature is intact when the message digest it carries matches the
//! digest of the bytes its `/ByteRange` covers. Certificates and the
//! signature value itself are not validated.

use log::{debug, warn};
use lopdf::ObjectId;
use openssl::hash::hash;

use crate::models::{PdfVerifySignaturesResult, VerifySignatureResult};
use crate::signing_document::SigningDocument;
use crate::{cms, Result};

pub struct SignatureChecker<'a> {
    signing_doc: SigningDocument<'a>,
}

impl<'a> SignatureChecker<'a> {
    pub fn from_pdf(pdf: &'a [u8]) -> Result<Self> {
        Ok(Self {
            signing_doc: SigningDocument::load(pdf)?,
        })
    }

    /// Checks every signature field, in form order. Returns `None` when the
    /// document has no signature fields.
    ///
    /// An unsigned field only breaks the overall integrity when it is not
    /// the last field.
    pub fn verify_signatures(&self) -> Result<Option<PdfVerifySignaturesResult>> {
        let signatures = self.signing_doc.get_signatures()?;
        if signatures.is_empty() {
            return Ok(None);
        }

        let mut integrity = true;
        let mut checks = Vec::with_capacity(signatures.len());
        for (i, &field) in signatures.iter().enumerate() {
            let is_last = i + 1 == signatures.len();
            let check = self.verify_signature(field, is_last)?;
            match check.integrity() {
                Some(intact) => integrity &= intact,
                None if !is_last => integrity = false,
                None => {}
            }
            checks.push(check);
        }

        Ok(Some(PdfVerifySignaturesResult {
            integrity,
            signatures: checks,
        }))
    }

    fn verify_signature(&self, field: ObjectId, is_last: bool) -> Result<VerifySignatureResult> {
        let name = self.signing_doc.get_signature_name(field)?;
        if !self.signing_doc.has_signature_value(field) {
            return Ok(VerifySignatureResult::Field {
                name,
                is_field: true,
            });
        }

        let sign_buffer = self.signing_doc.get_signature_buffer(field)?;
        // The padding after the DER value is ignored by the parser.
        let pkcs7 = self.signing_doc.get_signature_contents(field)?;
        let signer = cms::signer_digest(pkcs7)?;
        let digest = hash(cms::message_digest(&signer.algorithm)?, &sign_buffer)?;

        let mut integrity = digest[..] == *signer.message_digest;
        if !integrity {
            warn!("signature {name:?} does not match the signed bytes");
        }
        if is_last && !self.signing_doc.is_signature_for_entire_document(field)? {
            debug!("signature {name:?} is followed by unsigned bytes");
            integrity = false;
        }

        Ok(VerifySignatureResult::Signature {
            details: self.signing_doc.get_signature_details(field)?,
            name,
            integrity,
        })
    }
}
