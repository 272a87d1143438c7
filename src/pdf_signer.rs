//! Whole-document signing operations.
//!
//! Every operation takes the bytes of a PDF and returns new bytes made of the
//! input followed by one incremental update.

use chrono::Utc;
use log::info;

use crate::digital_signer::{AddSignatureFieldParameters, PdfDocumentDigitalSigner};
use crate::models::{
    AddFieldParameters, PdfVerifySignaturesResult, SignDigitalParameters, SignFieldParameters,
    SignVisualParameters, SignatureField, SignatureParameters,
};
use crate::settings::{SignatureSettings, SignerSettings};
use crate::signature_checker::SignatureChecker;
use crate::signature_computer::SignatureComputer;
use crate::signature_embedder::SignatureEmbedder;
use crate::signing_document::SigningDocument;
use crate::visual_signer::{AddVisualSignatureParameters, PdfDocumentVisualSigner};
use crate::{Error, Pkcs7Signer, Result};

fn page_index(page_number: usize) -> Result<usize> {
    page_number.checked_sub(1).ok_or(Error::PageNotFound(page_number))
}

/// Adds a signature field whose value is an unfilled placeholder sized by
/// `settings`.
pub fn add_placeholder(
    pdf: &[u8],
    info: &SignDigitalParameters,
    settings: &SignatureSettings,
) -> Result<Vec<u8>> {
    let page_index = page_index(info.page_number)?;
    let visual = info.visual.as_ref();
    let mut doc_signer = PdfDocumentDigitalSigner::from_pdf(pdf)?;

    let visual_ref = doc_signer.add_visual(
        visual.and_then(|v| v.background.as_deref()),
        visual.and_then(|v| v.texts.as_deref()),
    )?;
    let placeholder = doc_signer.add_signature_placeholder(
        info.signature.as_ref().unwrap_or(&SignatureParameters::default()),
        settings,
    )?;
    doc_signer.add_signature_field(AddSignatureFieldParameters {
        name: info.name.clone(),
        page_index,
        rectangle: visual.and_then(|v| v.rectangle),
        visual: visual_ref,
        placeholder: Some(placeholder),
        embed_font: visual.is_some_and(|v| v.texts.is_some()),
    })?;

    doc_signer.save()
}

/// Adds an empty signature field, to be signed later with
/// [`PdfSigner::sign_field`].
pub fn add_field(pdf: &[u8], info: &AddFieldParameters) -> Result<Vec<u8>> {
    let mut doc_signer = PdfDocumentDigitalSigner::from_pdf(pdf)?;
    doc_signer.add_signature_field(AddSignatureFieldParameters {
        name: info.name.clone(),
        page_index: page_index(info.page_number)?,
        rectangle: info.rectangle,
        ..Default::default()
    })?;
    doc_signer.save()
}

pub fn verify_signatures(pdf: &[u8]) -> Result<Option<PdfVerifySignaturesResult>> {
    SignatureChecker::from_pdf(pdf)?.verify_signatures()
}

/// Lists the unsigned signature fields.
pub fn get_fields(pdf: &[u8]) -> Result<Vec<SignatureField>> {
    let doc = SigningDocument::load(pdf)?;
    doc.get_fields()?
        .into_iter()
        .map(|field| -> Result<SignatureField> {
            let name = doc.get_signature_name(field)?;
            let page_number = doc.get_signature_page_number(&name)?;
            Ok(SignatureField { name, page_number })
        })
        .collect()
}

/// Adds signature fields to PDFs and signs them with detached PKCS #7
/// signatures.
pub struct PdfSigner<S = SignatureComputer> {
    settings: SignatureSettings,
    signer: S,
}

impl PdfSigner<SignatureComputer> {
    pub fn new(settings: &SignerSettings) -> Result<Self> {
        Self::with_signer(
            settings.signature,
            SignatureComputer::new(&settings.signature_computer)?,
        )
    }
}

impl<S: Pkcs7Signer> PdfSigner<S> {
    pub fn with_signer(settings: SignatureSettings, signer: S) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, signer })
    }

    pub fn add_placeholder(&self, pdf: &[u8], info: &SignDigitalParameters) -> Result<Vec<u8>> {
        add_placeholder(pdf, info, &self.settings)
    }

    pub fn add_field(&self, pdf: &[u8], info: &AddFieldParameters) -> Result<Vec<u8>> {
        add_field(pdf, info)
    }

    /// Adds a new signature field and signs it.
    pub fn sign(&self, pdf: &[u8], info: &SignDigitalParameters) -> Result<Vec<u8>> {
        let placeholder_pdf = self.add_placeholder(pdf, info)?;
        let embedder = SignatureEmbedder::from_pdf(&placeholder_pdf)?;
        self.compute_and_embed(&embedder, info.signature.as_ref())
    }

    /// Signs the existing unsigned field `info.field_name`.
    pub fn sign_field(&self, pdf: &[u8], info: &SignFieldParameters) -> Result<Vec<u8>> {
        let mut doc_signer = PdfDocumentDigitalSigner::from_pdf(pdf)?;
        let placeholder = doc_signer.add_signature_placeholder(
            info.signature.as_ref().unwrap_or(&SignatureParameters::default()),
            &self.settings,
        )?;
        let visual = info.visual.as_ref();
        let visual_ref = doc_signer.add_visual(
            visual.and_then(|v| v.background.as_deref()),
            visual.and_then(|v| v.texts.as_deref()),
        )?;
        doc_signer.update_signature(
            &info.field_name,
            placeholder,
            visual_ref,
            visual.is_some_and(|v| v.texts.is_some()),
        )?;
        let placeholder_pdf = doc_signer.save()?;

        let embedder = SignatureEmbedder::for_signature(&placeholder_pdf, &info.field_name)?;
        self.compute_and_embed(&embedder, info.signature.as_ref())
    }

    /// Draws a visual signature, see [`PdfVisualSigner`].
    pub fn sign_visual(&self, pdf: &[u8], info: &SignVisualParameters) -> Result<Vec<u8>> {
        PdfVisualSigner.sign(pdf, info)
    }

    pub fn verify_signatures(&self, pdf: &[u8]) -> Result<Option<PdfVerifySignaturesResult>> {
        verify_signatures(pdf)
    }

    pub fn get_fields(&self, pdf: &[u8]) -> Result<Vec<SignatureField>> {
        get_fields(pdf)
    }

    fn compute_and_embed(
        &self,
        embedder: &SignatureEmbedder,
        signature: Option<&SignatureParameters>,
    ) -> Result<Vec<u8>> {
        let signing_time = signature.and_then(|s| s.date).unwrap_or_else(Utc::now);
        let pkcs7 = self
            .signer
            .compute_signature(&embedder.sign_buffer()?, signing_time)?;
        let signed = embedder.embed_signature(&pkcs7)?;
        info!(
            "signed {} bytes, signature ranges {:?}",
            signed.len(),
            embedder.ranges().byte_range_array()
        );
        Ok(signed)
    }
}

/// Draws signatures made of an image and texts into page content, without
/// any cryptographic signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfVisualSigner;

impl PdfVisualSigner {
    pub fn sign(&self, pdf: &[u8], info: &SignVisualParameters) -> Result<Vec<u8>> {
        let mut doc_signer = PdfDocumentVisualSigner::from_pdf(pdf)?;
        doc_signer.add_visual_signature(AddVisualSignatureParameters {
            page_index: page_index(info.page_number)?,
            rectangle: info.rectangle,
            background: info.background.as_deref(),
            texts: info.texts.as_deref(),
            reverse_y: info.reverse_y,
            background_name: info.background_name.as_deref(),
        })?;
        doc_signer.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignatureText, VerifySignatureResult, VisualParameters};
    use crate::rectangle::Rectangle;
    use crate::test_pdf::{blank_pdf, png, unsigned_pkcs7};
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;

    /// Produces SignedData with a correct digest and a dummy signature.
    struct DigestOnly;

    impl Pkcs7Signer for DigestOnly {
        fn compute_signature(&self, data: &[u8], _signing_time: DateTime<Utc>) -> Result<Vec<u8>> {
            Ok(unsigned_pkcs7(data))
        }
    }

    fn signer() -> PdfSigner<DigestOnly> {
        PdfSigner::with_signer(
            SignatureSettings {
                signature_length: 2048,
                ..Default::default()
            },
            DigestOnly,
        )
        .unwrap()
    }

    fn visual() -> VisualParameters {
        VisualParameters {
            rectangle: Some(Rectangle::new(10.0, 10.0, 224.0, 80.0)),
            background: Some(png()),
            texts: Some(vec![
                SignatureText::new(["John", "Doe"]),
                SignatureText::new(["Signed by John Doe"]),
            ]),
        }
    }

    #[test]
    fn sign_then_verify() {
        let pdf = blank_pdf(2);
        let signer = signer();
        let date = Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap();

        let signed = signer
            .sign(
                &pdf,
                &SignDigitalParameters {
                    page_number: 2,
                    signature: Some(SignatureParameters {
                        name: Some("John Doe".to_owned()),
                        date: Some(date),
                        ..Default::default()
                    }),
                    visual: Some(visual()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(signed.starts_with(&pdf));
        let result = signer.verify_signatures(&signed).unwrap().unwrap();
        assert!(result.integrity);
        let VerifySignatureResult::Signature { name, details, .. } = &result.signatures[0] else {
            panic!("signature reported as a field");
        };
        assert_eq!(name, "Signature1");
        assert_eq!(details.name.as_deref(), Some("John Doe"));
        assert_eq!(details.date, Some(date));
        assert!(signer.get_fields(&signed).unwrap().is_empty());
    }

    #[test]
    fn page_number_zero_is_rejected() {
        let result = signer().add_field(&blank_pdf(1), &AddFieldParameters::default());

        assert!(matches!(result, Err(Error::PageNotFound(0))));
    }

    #[test]
    fn fields_are_listed_with_their_pages() {
        let signer = signer();
        let pdf = signer
            .add_field(
                &blank_pdf(3),
                &AddFieldParameters {
                    page_number: 3,
                    name: Some("Approval".to_owned()),
                    rectangle: None,
                },
            )
            .unwrap();
        let pdf = signer
            .add_field(
                &pdf,
                &AddFieldParameters {
                    page_number: 1,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            signer.get_fields(&pdf).unwrap(),
            vec![
                SignatureField {
                    name: "Approval".to_owned(),
                    page_number: 3
                },
                SignatureField {
                    name: "Signature2".to_owned(),
                    page_number: 1
                },
            ]
        );
    }

    #[test]
    fn signs_a_field_that_is_not_last() {
        let signer = signer();
        let mut pdf = blank_pdf(1);
        for name in ["First", "Second"] {
            pdf = signer
                .add_field(
                    &pdf,
                    &AddFieldParameters {
                        page_number: 1,
                        name: Some(name.to_owned()),
                        rectangle: None,
                    },
                )
                .unwrap();
        }

        let signed = signer
            .sign_field(
                &pdf,
                &SignFieldParameters {
                    field_name: "First".to_owned(),
                    visual: Some(visual()),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = signer.verify_signatures(&signed).unwrap().unwrap();
        assert_eq!(
            result.signatures.iter().map(|s| s.integrity()).collect::<Vec<_>>(),
            vec![Some(true), None]
        );
        assert!(result.integrity);
        assert_eq!(signer.get_fields(&signed).unwrap().len(), 1);

        assert!(matches!(
            signer.sign_field(
                &signed,
                &SignFieldParameters {
                    field_name: "First".to_owned(),
                    ..Default::default()
                }
            ),
            Err(Error::AlreadySigned(_))
        ));
    }

    #[test]
    fn visual_signing_without_content_changes_nothing_but_the_trailer() {
        let pdf = blank_pdf(1);

        let signed = PdfVisualSigner
            .sign(
                &pdf,
                &SignVisualParameters {
                    page_number: 1,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(signed, SigningDocument::load(&pdf).unwrap().save().unwrap());
    }
}
