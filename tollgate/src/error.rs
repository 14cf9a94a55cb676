//! Errors raised while decoding, verifying and signing tokens

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::jwa;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// One of the three dot-separated sections of a compact token
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    /// The JOSE header
    Header,
    /// The claims payload
    Payload,
    /// The signature
    Signature,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Payload => "payload",
            Self::Signature => "signature",
        })
    }
}

/// The token could not be decoded
#[derive(Debug, Error)]
pub enum MalformedToken {
    /// The token is not three dot-separated sections
    #[error("token must have exactly three sections")]
    SectionCount,

    /// A section is not base64url-encoded JSON of the expected shape
    #[error("malformed token {section}")]
    Section {
        /// The offending section
        section: Section,
        /// Why it could not be decoded
        #[source]
        source: BoxError,
    },
}

impl MalformedToken {
    /// The section that could not be decoded, if the token had three of them
    #[must_use]
    pub fn section(&self) -> Option<Section> {
        match self {
            Self::SectionCount => None,
            Self::Section { section, .. } => Some(*section),
        }
    }
}

pub(crate) fn malformed<E>(section: Section) -> impl FnOnce(E) -> MalformedToken
where
    E: Into<BoxError>,
{
    move |source| MalformedToken::Section {
        section,
        source: source.into(),
    }
}

/// The algorithm name is not one this crate supports
#[derive(Debug, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnknownAlgorithm {
    alg: String,
}

pub(crate) fn unknown_algorithm(alg: String) -> UnknownAlgorithm {
    UnknownAlgorithm { alg }
}

/// The key cannot be used with the token's algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key incompatible with algorithm '{alg}'")]
pub struct IncompatibleAlgorithm {
    alg: jwa::Algorithm,
}

impl IncompatibleAlgorithm {
    /// The algorithm the key was asked to use
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.alg
    }
}

pub(crate) const fn incompatible_algorithm(alg: jwa::Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The signature does not match the signed message
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The key material is unusable
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[source]
    source: BoxError,
}

pub(crate) fn key_rejected(source: impl Into<BoxError>) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// The cryptographic backend failed unexpectedly
#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
#[error("unexpected error")]
pub struct Unexpected {
    #[source]
    source: BoxError,
}

#[cfg(feature = "private-keys")]
pub(crate) fn unexpected(source: impl Into<BoxError>) -> Unexpected {
    Unexpected {
        source: source.into(),
    }
}

/// A key refused to verify a token's signature
#[derive(Copy, Clone, Debug, Error)]
pub enum JwkVerifyError {
    /// The key is pinned to a different algorithm
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// The key is published for a use other than signing
    #[error("key is not meant for signature verification")]
    UsageMismatch,

    /// The signature is invalid
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

/// A token failed verification
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The signing key rejected the token
    #[error("token rejected by JWK")]
    JwkVerifyError(#[from] JwkVerifyError),

    /// The token could not be decoded
    #[error(transparent)]
    MalformedToken(#[from] MalformedToken),

    /// The claims validator rejected the token
    #[error("token rejected by claims validator")]
    ClaimsRejected(#[from] ClaimsRejected),
}

impl JwtVerifyError {
    /// Whether the token could not be decoded at all
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedToken(_))
    }
}

/// A signed token could not be produced
#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The header or payload could not be serialized
    #[error("unable to serialize token {section}")]
    Serialization {
        /// The section that failed to serialize
        section: Section,
        /// The serializer error
        #[source]
        source: serde_json::Error,
    },

    /// The key refused to sign
    #[error(transparent)]
    Signing(#[from] Unexpected),
}

/// The token's claims were rejected
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum ClaimsRejected {
    /// The token algorithm is not approved
    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// None of the token audiences is allowed
    #[error("invalid audience")]
    InvalidAudience,

    /// The token issuer is not the expected one
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The `exp` claim is in the past
    #[error("token expired")]
    TokenExpired,

    /// The `nbf` claim is in the future
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A required claim is missing
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_section_is_reported() {
        let err = malformed(Section::Payload)("not json");
        assert_eq!(err.section(), Some(Section::Payload));
        assert_eq!(err.to_string(), "malformed token payload");
        assert!(err.source().is_some());

        assert_eq!(MalformedToken::SectionCount.section(), None);
    }

    #[test]
    fn rejected_claims_name_the_claim() {
        assert_eq!(
            ClaimsRejected::MissingRequiredClaim("sub").to_string(),
            "required sub claim missing"
        );
    }
}
