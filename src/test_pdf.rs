//! Documents and images used by unit tests.

use std::io::Cursor;

use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::xref::XrefType;
use lopdf::{dictionary, Document, Object, Stream};
use lazy_static::lazy_static;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509Builder, X509NameBuilder};
use x509_cert::Certificate;

use crate::digital_signer::{AddSignatureFieldParameters, PdfDocumentDigitalSigner};
use crate::models::SignatureParameters;
use crate::settings::SignatureSettings;
use crate::signature_embedder::SignatureEmbedder;
use crate::cms;

lazy_static! {
    /// A self-signed P-256 certificate, only used as a signer identifier.
    pub(crate) static ref TEST_CERTIFICATE: Certificate = {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "test").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        cms::certificate(&builder.build().to_der().unwrap()).unwrap()
    };
}

/// A document with `pages` empty A4 pages, saved with a cross-reference
/// stream.
///
/// The media box and resources are inherited from the page tree root.
pub(crate) fn blank_pdf(pages: usize) -> Vec<u8> {
    blank_pdf_with_xref(pages, XrefType::CrossReferenceStream)
}

/// [`blank_pdf`] with the cross-reference section of the given type.
pub(crate) fn blank_pdf_with_xref(pages: usize, xref_type: XrefType) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    doc.reference_table.cross_reference_type = xref_type;
    let pages_id = doc.new_object_id();
    let content = Content {
        operations: vec![Operation::new("n", vec![])],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => Object::Integer(pages as i64),
            "Kids" => Object::Array(kids),
            "Resources" => Object::Dictionary(dictionary! {}),
            "MediaBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ]),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).unwrap();
    pdf
}

/// A small half transparent PNG.
pub(crate) fn png() -> Vec<u8> {
    let image = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 128]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Adds an unsigned field in a new incremental update.
pub(crate) fn with_field(pdf: &[u8], name: &str) -> Vec<u8> {
    let mut signer = PdfDocumentDigitalSigner::from_pdf(pdf).unwrap();
    signer
        .add_signature_field(AddSignatureFieldParameters {
            name: Some(name.to_owned()),
            ..Default::default()
        })
        .unwrap();
    signer.save().unwrap()
}

/// Adds a field holding an unfilled placeholder in a new incremental update.
pub(crate) fn with_placeholder(pdf: &[u8], name: &str, signature_length: usize) -> Vec<u8> {
    let mut signer = PdfDocumentDigitalSigner::from_pdf(pdf).unwrap();
    let placeholder = signer
        .add_signature_placeholder(
            &SignatureParameters {
                reason: Some("testing".to_owned()),
                ..Default::default()
            },
            &SignatureSettings {
                signature_length,
                ..Default::default()
            },
        )
        .unwrap();
    signer
        .add_signature_field(AddSignatureFieldParameters {
            name: Some(name.to_owned()),
            placeholder: Some(placeholder),
            ..Default::default()
        })
        .unwrap();
    signer.save().unwrap()
}

/// A SignedData carrying the SHA-256 digest of `data` and a dummy RSA
/// signature. Enough for digest checks, not for certificate validation.
pub(crate) fn unsigned_pkcs7(data: &[u8]) -> Vec<u8> {
    let digest = hash(MessageDigest::sha256(), data).unwrap();
    let time = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
    let attributes = cms::signed_attributes(&digest, &time).unwrap();
    cms::signed_data(attributes, &[0x22; 8], &TEST_CERTIFICATE, &[]).unwrap()
}

/// Fills the last placeholder of `pdf` with [`unsigned_pkcs7`].
pub(crate) fn fill_placeholder(pdf: &[u8]) -> Vec<u8> {
    let embedder = SignatureEmbedder::from_pdf(pdf).unwrap();
    let pkcs7 = unsigned_pkcs7(&embedder.sign_buffer().unwrap());
    embedder.embed_signature(&pkcs7).unwrap()
}
