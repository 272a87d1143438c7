use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Space reserved in signature placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureSettings {
    /// Number of hex digits reserved for the signature in `/Contents`.
    pub signature_length: usize,
    /// Integer written in the `/ByteRange` placeholder. Its digit count
    /// bounds the offsets the final array can hold.
    pub range_placeholder: u64,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            signature_length: 8192,
            range_placeholder: 9_999_999_999,
        }
    }
}

impl SignatureSettings {
    pub fn validate(&self) -> Result<()> {
        if self.signature_length == 0 || self.signature_length % 2 != 0 {
            return Err(Error::InvalidSettings(
                "signature length must be a positive even number",
            ));
        }
        if self.range_placeholder == 0 || self.range_placeholder > i64::MAX as u64 {
            return Err(Error::InvalidSettings("range placeholder out of bounds"));
        }
        Ok(())
    }
}

/// Key material of the signer.
#[derive(Clone)]
pub enum SignatureComputerSettings {
    P12 {
        certificate: Vec<u8>,
        password: String,
    },
    Pem {
        certificate: String,
        key: String,
        password: String,
    },
}

#[derive(Clone)]
pub struct SignerSettings {
    pub signature: SignatureSettings,
    pub signature_computer: SignatureComputerSettings,
}
