//! OpenSSL based signer.
//!
//! See [`SignatureComputer`].

use chrono::{DateTime, Utc};
use der::Encode;
use log::debug;
use openssl::hash::{hash, MessageDigest};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;

use crate::settings::SignatureComputerSettings;
use crate::{cms, Error, Pkcs7Signer, Result};

/// Computes detached PKCS #7 signatures with an RSA key.
///
/// The signer certificate and every other certificate found with the key
/// are embedded in the signature.
pub struct SignatureComputer {
    private_key: PKey<Private>,
    certificate: X509,
    certificates: Vec<X509>,
}

impl SignatureComputer {
    pub fn new(settings: &SignatureComputerSettings) -> Result<Self> {
        match settings {
            SignatureComputerSettings::P12 {
                certificate,
                password,
            } => Self::from_pkcs12(certificate, password),
            SignatureComputerSettings::Pem {
                certificate,
                key,
                password,
            } => Self::from_pem(certificate.as_bytes(), key.as_bytes(), password),
        }
    }

    /// Loads a password protected PKCS #12 container.
    ///
    /// The signer is the first certificate whose public key matches the
    /// private key.
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self> {
        let parsed = Pkcs12::from_der(der)?.parse2(password)?;

        let mut certificates = Vec::new();
        certificates.extend(parsed.cert);
        if let Some(ca) = parsed.ca {
            certificates.extend(ca);
        }
        if certificates.is_empty() {
            return Err(Error::MissingCertificateBag);
        }
        let private_key = parsed.pkey.ok_or(Error::MissingKeyBag)?;

        let certificate = certificates
            .iter()
            .find(|cert| {
                cert.public_key()
                    .map(|key| key.public_eq(&private_key))
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or(Error::NoMatchingCertificate)?;

        Self::with_key(private_key, certificate, certificates)
    }

    /// Loads a PEM certificate and a PEM private key, which may be encrypted
    /// with `password`.
    pub fn from_pem(certificate: &[u8], key: &[u8], password: &str) -> Result<Self> {
        let certificate = X509::from_pem(certificate)?;
        let private_key = PKey::private_key_from_pem_passphrase(key, password.as_bytes())?;
        let certificates = vec![certificate.clone()];

        Self::with_key(private_key, certificate, certificates)
    }

    fn with_key(
        private_key: PKey<Private>,
        certificate: X509,
        certificates: Vec<X509>,
    ) -> Result<Self> {
        if private_key.id() != Id::RSA {
            return Err(Error::UnsupportedKey);
        }
        Ok(Self {
            private_key,
            certificate,
            certificates,
        })
    }

    /// The certificate matching the private key.
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }
}

impl Pkcs7Signer for SignatureComputer {
    fn compute_signature(&self, data: &[u8], signing_time: DateTime<Utc>) -> Result<Vec<u8>> {
        let digest = hash(MessageDigest::sha256(), data)?;
        let attributes = cms::signed_attributes(&digest, &signing_time)?;

        let mut signer = Signer::new(MessageDigest::sha256(), &self.private_key)?;
        signer.update(&attributes.to_der()?)?;
        let signature = signer.sign_to_vec()?;

        let certificate = cms::certificate(&self.certificate.to_der()?)?;
        let certificates = self
            .certificates
            .iter()
            .map(|cert| cms::certificate(&cert.to_der()?))
            .collect::<Result<Vec<_>>>()?;

        let pkcs7 = cms::signed_data(attributes, &signature, &certificate, &certificates)?;
        debug!(
            "computed a {} byte signature over {} bytes",
            pkcs7.len(),
            data.len()
        );
        Ok(pkcs7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
    use openssl::rsa::Rsa;
    use openssl::stack::Stack;
    use openssl::symm::Cipher;
    use openssl::x509::store::X509StoreBuilder;
    use openssl::x509::{X509Builder, X509NameBuilder};

    fn rsa_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn self_signed(key: &PKey<Private>, common_name: &str) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        // A serial with the high bit set needs a leading zero in DER.
        let serial = BigNum::from_u32(0x8123_4567).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn pkcs12(key: Option<&PKey<Private>>, cert: Option<&X509>, ca: Option<&X509>) -> Vec<u8> {
        let mut builder = Pkcs12::builder();
        builder.name("test");
        if let Some(key) = key {
            builder.pkey(key);
        }
        if let Some(cert) = cert {
            builder.cert(cert);
        }
        if let Some(ca) = ca {
            let mut stack = Stack::new().unwrap();
            stack.push(ca.clone()).unwrap();
            builder.ca(stack);
        }
        builder.build2("password").unwrap().to_der().unwrap()
    }

    fn verify_with_openssl(signature: &[u8], data: &[u8]) {
        let pkcs7 = Pkcs7::from_der(signature).unwrap();
        let store = X509StoreBuilder::new().unwrap().build();
        let certs = Stack::new().unwrap();
        pkcs7
            .verify(
                &certs,
                &store,
                Some(data),
                None,
                Pkcs7Flags::NOVERIFY | Pkcs7Flags::BINARY,
            )
            .unwrap();
    }

    #[test]
    fn pkcs12_signature_verifies_with_openssl() {
        let key = rsa_key();
        let cert = self_signed(&key, "signer");
        let computer = SignatureComputer::from_pkcs12(&pkcs12(Some(&key), Some(&cert), None), "password").unwrap();
        assert_eq!(computer.certificate().to_der().unwrap(), cert.to_der().unwrap());

        let data = b"signed bytes of a PDF";
        let signature = computer.compute_signature(data, Utc::now()).unwrap();

        verify_with_openssl(&signature, data);
        let signer = cms::signer_digest(&signature).unwrap();
        assert_eq!(signer.algorithm, cms::OID_SHA256);
        assert_eq!(
            signer.message_digest,
            hash(MessageDigest::sha256(), data).unwrap().to_vec()
        );
    }

    #[test]
    fn pem_signature_verifies_with_openssl() {
        let key = rsa_key();
        let cert = self_signed(&key, "pem signer");
        let key_pem = key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"password")
            .unwrap();

        let computer = SignatureComputer::new(&SignatureComputerSettings::Pem {
            certificate: String::from_utf8(cert.to_pem().unwrap()).unwrap(),
            key: String::from_utf8(key_pem).unwrap(),
            password: "password".to_owned(),
        })
        .unwrap();

        let signature = computer.compute_signature(b"data", Utc::now()).unwrap();
        verify_with_openssl(&signature, b"data");
    }

    #[test]
    fn signing_time_under_a_second_apart_gives_same_signature() {
        let key = rsa_key();
        let cert = self_signed(&key, "signer");
        let computer = SignatureComputer::from_pkcs12(&pkcs12(Some(&key), Some(&cert), None), "password").unwrap();

        let time = Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap();
        let first = computer.compute_signature(b"data", time).unwrap();
        let second = computer
            .compute_signature(b"data", time + chrono::Duration::milliseconds(500))
            .unwrap();
        let third = computer
            .compute_signature(b"data", time + chrono::Duration::seconds(1))
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn wrong_password_fails() {
        let key = rsa_key();
        let cert = self_signed(&key, "signer");

        let result = SignatureComputer::from_pkcs12(&pkcs12(Some(&key), Some(&cert), None), "wrong");

        assert!(matches!(result, Err(Error::OpenSsl(_))));
    }

    #[test]
    fn missing_bags_fail() {
        let key = rsa_key();
        let cert = self_signed(&key, "signer");

        let no_cert = SignatureComputer::from_pkcs12(&pkcs12(Some(&key), None, None), "password");
        assert!(matches!(no_cert, Err(Error::MissingCertificateBag)));

        let no_key = SignatureComputer::from_pkcs12(&pkcs12(None, Some(&cert), None), "password");
        assert!(matches!(no_key, Err(Error::MissingKeyBag)));
    }

    #[test]
    fn certificate_must_match_key() {
        let key = rsa_key();
        let other = rsa_key();
        let other_cert = self_signed(&other, "somebody else");

        let result = SignatureComputer::from_pkcs12(
            &pkcs12(Some(&key), None, Some(&other_cert)),
            "password",
        );

        assert!(matches!(result, Err(Error::NoMatchingCertificate)));
        assert_eq!(
            Error::NoMatchingCertificate.to_string(),
            "failed to find a certificate that matches the private key"
        );
    }
}
