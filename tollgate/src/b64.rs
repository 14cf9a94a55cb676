//! Byte buffers that serialize as URL-safe base64 without padding
//!
//! Token segments, signatures, and RSA key components are all carried in this
//! encoding. The underlying data is held as raw bytes; the cost of encoding
//! is only paid when formatting or serializing.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Data that is not valid URL-safe, unpadded base64
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid base64url data")]
pub struct InvalidBase64Data {
    #[from]
    source: base64::DecodeError,
}

/// Owned bytes, encoded as URL-safe base64 with no padding
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[must_use]
pub struct Base64Url(Vec<u8>);

impl Base64Url {
    /// Wraps raw bytes
    #[inline]
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self(raw.into())
    }

    /// Decodes an encoded string
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid URL-safe, unpadded base64.
    pub fn from_encoded(enc: impl AsRef<[u8]>) -> Result<Self, InvalidBase64Data> {
        Ok(Self(URL_SAFE_NO_PAD.decode(enc)?))
    }

    /// The raw bytes
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64Url {
    #[inline]
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl From<&'_ [u8]> for Base64Url {
    #[inline]
    fn from(raw: &[u8]) -> Self {
        Self(raw.to_vec())
    }
}

impl AsRef<[u8]> for Base64Url {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// Debug output is fenced in backticks
impl fmt::Debug for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "`{}`", self)
    }
}

impl Serialize for Base64Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Base64Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_encoded(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn encodes_without_padding() {
        let data = Base64Url::from_raw(&b"signature"[..]);
        assert_eq!(data.to_string(), "c2lnbmF0dXJl");

        let data = Base64Url::from_raw(&b"si"[..]);
        assert_eq!(data.to_string(), "c2k");
    }

    #[test]
    fn decodes_url_safe_alphabet() -> Result<()> {
        let data = Base64Url::from_encoded("-_8")?;
        assert_eq!(data.as_slice(), &[0xfb, 0xff]);
        Ok(())
    }

    #[test]
    fn rejects_standard_alphabet() {
        assert!(Base64Url::from_encoded("+/8").is_err());
    }

    #[test]
    fn rejects_padding() {
        assert!(Base64Url::from_encoded("c2k=").is_err());
    }

    #[test]
    fn debug_is_fenced() {
        let data = Base64Url::from_raw(&b"si"[..]);
        assert_eq!(format!("{:?}", data), "`c2k`");
    }

    #[test]
    fn deserializes_from_json_string() -> Result<()> {
        let data: Base64Url = serde_json::from_str(r#""AQAB""#)?;
        assert_eq!(data.as_slice(), &[1, 0, 1]);
        Ok(())
    }
}
