//! Implementations of the JSON Web Algorithms (JWA) standard
//!
//! Only the RSA signature families are supported. The specifications for
//! these algorithms can be found in [RFC7518][].
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

use std::{convert::TryFrom, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error;

pub mod rsa;

/// RSA signing algorithms
///
/// This list may be expanded in the future.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
#[non_exhaustive]
pub enum Algorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512
    PS512,
}

impl Algorithm {
    /// Gets the usage related to this algorithm
    pub const fn to_usage(self) -> Usage {
        Usage::Signing
    }

    /// The name of the algorithm as it appears in a JOSE header
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
        }
    }

    pub(crate) fn verification_params(self) -> &'static ring::signature::RsaParameters {
        match self {
            Self::RS256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RS384 => &ring::signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RS512 => &ring::signature::RSA_PKCS1_2048_8192_SHA512,
            Self::PS256 => &ring::signature::RSA_PSS_2048_8192_SHA256,
            Self::PS384 => &ring::signature::RSA_PSS_2048_8192_SHA384,
            Self::PS512 => &ring::signature::RSA_PSS_2048_8192_SHA512,
        }
    }

    #[cfg(feature = "private-keys")]
    pub(crate) fn signing_params(self) -> &'static dyn ring::signature::RsaEncoding {
        match self {
            Self::RS256 => &ring::signature::RSA_PKCS1_SHA256,
            Self::RS384 => &ring::signature::RSA_PKCS1_SHA384,
            Self::RS512 => &ring::signature::RSA_PKCS1_SHA512,
            Self::PS256 => &ring::signature::RSA_PSS_SHA256,
            Self::PS384 => &ring::signature::RSA_PSS_SHA384,
            Self::PS512 => &ring::signature::RSA_PSS_SHA512,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = error::UnknownAlgorithm;

    #[inline]
    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        match value {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            _ => Err(error::unknown_algorithm(value.to_string())),
        }
    }
}

impl FromStr for Algorithm {
    type Err = error::UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// The intended use for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum Usage {
    /// Signing and verification
    #[serde(rename = "sig")]
    Signing,

    /// Encryption
    #[serde(rename = "enc")]
    Encryption,
}
