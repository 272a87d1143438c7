//! PKCS #7 SignedData structures of detached PDF signatures.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use der::asn1::{Any, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode, SliceReader};
use openssl::hash::MessageDigest;
use x509_cert::attr::Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::{Error, Result};

pub(crate) const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub(crate) const OID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub(crate) const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub(crate) const OID_CONTENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub(crate) const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
pub(crate) const OID_SIGNING_TIME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

pub(crate) const OID_MD5: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
pub(crate) const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
pub(crate) const OID_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub(crate) const OID_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub(crate) const OID_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");
pub(crate) const OID_SHA224: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");

pub(crate) fn message_digest(digest_oid: &ObjectIdentifier) -> Result<MessageDigest> {
    let digests = [
        (OID_MD5, MessageDigest::md5()),
        (OID_SHA1, MessageDigest::sha1()),
        (OID_SHA224, MessageDigest::sha224()),
        (OID_SHA256, MessageDigest::sha256()),
        (OID_SHA384, MessageDigest::sha384()),
        (OID_SHA512, MessageDigest::sha512()),
    ];
    digests
        .into_iter()
        .find(|(oid, _)| oid == digest_oid)
        .map(|(_, digest)| digest)
        .ok_or(Error::UnsupportedDigestAlgorithm)
}

/// Parses a DER certificate, as exported by OpenSSL.
pub(crate) fn certificate(der: &[u8]) -> Result<Certificate> {
    Ok(Certificate::from_der(der)?)
}

/// An algorithm identifier with explicit NULL parameters.
fn algorithm(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: Some(Any::null()),
    }
}

fn attribute(oid: ObjectIdentifier, value: &(impl der::Tagged + der::EncodeValue)) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![Any::encode_from(value)?])?,
    })
}

/// UTCTime between 1950 and 2049, GeneralizedTime otherwise.
fn signing_time(time: &DateTime<Utc>) -> Result<Time> {
    let seconds = u64::try_from(time.timestamp()).map_err(|_| {
        Error::InvalidSettings("signing time must not be earlier than 1970")
    })?;
    let since_epoch = Duration::from_secs(seconds);
    Ok(if (1950..2050).contains(&time.year()) {
        Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_unix_duration(since_epoch)?)
    })
}

/// The authenticated attributes: content type, message digest and signing
/// time, the latter with second resolution.
///
/// Their DER encoding, a SET OF, is what the private key signs.
pub(crate) fn signed_attributes(digest: &[u8], time: &DateTime<Utc>) -> Result<SignedAttributes> {
    Ok(SetOfVec::try_from(vec![
        attribute(OID_CONTENT_TYPE, &OID_DATA)?,
        attribute(OID_MESSAGE_DIGEST, &OctetString::new(digest)?)?,
        attribute(OID_SIGNING_TIME, &signing_time(time)?)?,
    ])?)
}

/// Assembles a detached SignedData with a single SHA-256/RSA signer,
/// wrapped in its ContentInfo.
///
/// The signer is identified by the issuer and serial number of `signer`.
/// Every certificate of `certificates` is embedded.
pub(crate) fn signed_data(
    signed_attributes: SignedAttributes,
    signature: &[u8],
    signer: &Certificate,
    certificates: &[Certificate],
) -> Result<Vec<u8>> {
    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: signer.tbs_certificate.issuer.clone(),
            serial_number: signer.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: algorithm(OID_SHA256),
        signed_attrs: Some(signed_attributes),
        signature_algorithm: algorithm(OID_RSA_ENCRYPTION),
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let certificates = certificates
        .iter()
        .cloned()
        .map(CertificateChoices::Certificate)
        .collect::<Vec<_>>();
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![algorithm(OID_SHA256)])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certificates)?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// What the first signer of a SignedData claims about the signed content.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SignerDigest {
    pub(crate) algorithm: ObjectIdentifier,
    pub(crate) message_digest: Vec<u8>,
}

/// Reads the digest algorithm and the messageDigest attribute of the first
/// signer.
///
/// Bytes after the ContentInfo are ignored. Anything that is not a DER
/// SignedData is [`Error::InvalidPkcs7`].
pub(crate) fn signer_digest(pkcs7: &[u8]) -> Result<SignerDigest> {
    let invalid = |_: der::Error| Error::InvalidPkcs7;

    let mut reader = SliceReader::new(pkcs7).map_err(invalid)?;
    let content_info = ContentInfo::decode(&mut reader).map_err(invalid)?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(Error::InvalidPkcs7);
    }
    let signed_data = content_info
        .content
        .to_der()
        .and_then(|content| SignedData::from_der(&content))
        .map_err(invalid)?;

    let signer = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or(Error::InvalidPkcs7)?;
    let value = signer
        .signed_attrs
        .iter()
        .flat_map(|attributes| attributes.iter())
        .find(|attribute| attribute.oid == OID_MESSAGE_DIGEST)
        .and_then(|attribute| attribute.values.iter().next())
        .ok_or(Error::InvalidPkcs7)?;
    let message_digest = value
        .to_der()
        .and_then(|value| OctetString::from_der(&value))
        .map_err(invalid)?;

    Ok(SignerDigest {
        algorithm: signer.digest_alg.oid,
        message_digest: message_digest.into_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pdf::TEST_CERTIFICATE;
    use chrono::TimeZone;

    fn time_bytes(time: &DateTime<Utc>) -> Vec<u8> {
        signing_time(time).unwrap().to_der().unwrap()
    }

    fn pkcs7(digest: &[u8]) -> Vec<u8> {
        let time = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let attributes = signed_attributes(digest, &time).unwrap();
        signed_data(
            attributes,
            &[0x22; 8],
            &TEST_CERTIFICATE,
            &[TEST_CERTIFICATE.clone()],
        )
        .unwrap()
    }

    #[test]
    fn signing_time_has_second_resolution() {
        let time = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let later = time + chrono::Duration::milliseconds(999);

        assert_eq!(time_bytes(&time), time_bytes(&later));
        assert_eq!(time_bytes(&time), b"\x17\x0d230102030405Z");

        let far = Utc.with_ymd_and_hms(2051, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(time_bytes(&far), b"\x18\x0f20510102030405Z");
    }

    #[test]
    fn signing_time_before_1970_is_rejected() {
        let time = Utc.with_ymd_and_hms(1960, 1, 2, 3, 4, 5).unwrap();
        assert!(matches!(
            signing_time(&time),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn signer_is_identified_by_issuer_and_serial() {
        let pkcs7 = pkcs7(&[0x11; 32]);
        let content_info = ContentInfo::from_der(&pkcs7).unwrap();
        let signed_data = SignedData::from_der(&content_info.content.to_der().unwrap()).unwrap();
        let signer = signed_data.signer_infos.0.iter().next().unwrap();

        let SignerIdentifier::IssuerAndSerialNumber(sid) = &signer.sid else {
            panic!("signer identified by key");
        };
        assert_eq!(sid.issuer, TEST_CERTIFICATE.tbs_certificate.issuer);
        assert_eq!(
            sid.serial_number,
            TEST_CERTIFICATE.tbs_certificate.serial_number
        );
        assert_eq!(signed_data.certificates.unwrap().0.len(), 1);
        assert_eq!(signer.signature.as_bytes(), &[0x22; 8]);
    }

    #[test]
    fn signer_digest_reads_back_the_message_digest() {
        let digest = [0x11; 32];

        assert_eq!(
            signer_digest(&pkcs7(&digest)).unwrap(),
            SignerDigest {
                algorithm: OID_SHA256,
                message_digest: digest.to_vec(),
            }
        );
    }

    #[test]
    fn signer_digest_ignores_trailing_bytes() {
        let mut pkcs7 = pkcs7(&[0x33; 32]);
        pkcs7.extend_from_slice(&[0x01, 0x00]);

        assert_eq!(signer_digest(&pkcs7).unwrap().message_digest, vec![0x33u8; 32]);
    }

    #[test]
    fn rejects_other_content_types() {
        let data = ContentInfo {
            content_type: OID_DATA,
            content: Any::encode_from(&OctetString::new(vec![1, 2, 3]).unwrap()).unwrap(),
        }
        .to_der()
        .unwrap();

        assert!(matches!(signer_digest(&data), Err(Error::InvalidPkcs7)));
        assert!(matches!(signer_digest(&[0xAA; 4]), Err(Error::InvalidPkcs7)));
        assert!(matches!(signer_digest(&[]), Err(Error::InvalidPkcs7)));
    }

    #[test]
    fn deeply_nested_indefinite_lengths_are_rejected() {
        let nested = hex::decode("3080".repeat(60_000)).unwrap();

        assert!(matches!(signer_digest(&nested), Err(Error::InvalidPkcs7)));
    }

    #[test]
    fn maps_digest_algorithms() {
        assert_eq!(
            message_digest(&OID_SHA256).unwrap().type_(),
            MessageDigest::sha256().type_()
        );
        assert_eq!(
            message_digest(&OID_SHA1).unwrap().type_(),
            MessageDigest::sha1().type_()
        );
        assert!(matches!(
            message_digest(&OID_RSA_ENCRYPTION),
            Err(Error::UnsupportedDigestAlgorithm)
        ));
    }
}
