#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lazy_static::lazy_static;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use pdf_signer::{SignatureComputerSettings, SignatureSettings, SignerSettings};

pub const PASSWORD: &str = "password";

pub struct Identity {
    pub key: PKey<Private>,
    pub certificate: X509,
}

lazy_static! {
    pub static ref IDENTITY: Identity = identity("Test Signer");
}

pub fn identity(common_name: &str) -> Identity {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    Identity {
        key,
        certificate: builder.build(),
    }
}

impl Identity {
    pub fn pkcs12(&self) -> Vec<u8> {
        let mut builder = Pkcs12::builder();
        builder.name("signer");
        builder.pkey(&self.key);
        builder.cert(&self.certificate);
        builder.build2(PASSWORD).unwrap().to_der().unwrap()
    }

    pub fn p12_settings(&self) -> SignerSettings {
        SignerSettings {
            signature: SignatureSettings::default(),
            signature_computer: SignatureComputerSettings::P12 {
                certificate: self.pkcs12(),
                password: PASSWORD.to_owned(),
            },
        }
    }

    pub fn pem_settings(&self) -> SignerSettings {
        let key = self
            .key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), PASSWORD.as_bytes())
            .unwrap();
        SignerSettings {
            signature: SignatureSettings::default(),
            signature_computer: SignatureComputerSettings::Pem {
                certificate: String::from_utf8(self.certificate.to_pem().unwrap()).unwrap(),
                key: String::from_utf8(key).unwrap(),
                password: PASSWORD.to_owned(),
            },
        }
    }
}

/// A document with `pages` empty A4 pages.
pub fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Integer(24)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(600)]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
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
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
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

pub fn png() -> Vec<u8> {
    let image = RgbaImage::from_fn(16, 8, |x, y| Rgba([(x * 16) as u8, (y * 32) as u8, 128, 200]));
    encode(DynamicImage::ImageRgba8(image), ImageOutputFormat::Png)
}

pub fn jpeg() -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 8, Rgb([20, 120, 220]));
    encode(DynamicImage::ImageRgb8(image), ImageOutputFormat::Jpeg(90))
}

fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

/// Verifies a detached signature and its signer certificate's key with
/// OpenSSL, without checking the certificate chain.
pub fn openssl_verify(pkcs7_der: &[u8], signed_data: &[u8]) {
    let pkcs7 = Pkcs7::from_der(pkcs7_der).unwrap();
    let store = X509StoreBuilder::new().unwrap().build();
    let certs = Stack::new().unwrap();
    pkcs7
        .verify(
            &certs,
            &store,
            Some(signed_data),
            None,
            Pkcs7Flags::NOVERIFY | Pkcs7Flags::BINARY,
        )
        .unwrap();
}
