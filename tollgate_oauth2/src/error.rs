//! The uniform authorization error

use std::fmt;

use http::StatusCode;
use serde::{ser::SerializeStruct, Serialize, Serializer};
use thiserror::Error;
use tollgate::error::JwtVerifyError;

use crate::jwks::KeySetError;

/// The reason an `Authorization` header was rejected
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InvalidHeader {
    /// The header did not use the `Bearer` scheme
    MissingBearerScheme,
    /// The header carried the scheme but no token
    TokenNotFound,
    /// The header carried more than a scheme and a token
    NotBearerToken,
    /// The header or the token header could not be read
    Malformed,
}

impl InvalidHeader {
    /// Human-readable description of the defect
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingBearerScheme => "Authorization header must start with \"Bearer\".",
            Self::TokenNotFound => "Token not found.",
            Self::NotBearerToken => "Authorization header must be bearer token.",
            Self::Malformed => "Authorization malformed.",
        }
    }
}

impl fmt::Display for InvalidHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while authenticating or authorizing a request
///
/// Every variant maps to a machine-readable [`code`][AuthError::code] and an
/// HTTP [`status`][AuthError::status]. Several variants share a code and are
/// distinguished only by their status and description.
///
/// | variant | code | status |
/// |---|---|---|
/// | [`AuthorizationHeaderMissing`][Self::AuthorizationHeaderMissing] | `authorization_header_missing` | 401 |
/// | [`InvalidHeader`][Self::InvalidHeader] | `invalid_header` | 401 |
/// | [`KeySetUnavailable`][Self::KeySetUnavailable] | `key_set_unavailable` | 401 |
/// | [`SigningKeyNotFound`][Self::SigningKeyNotFound] | `invalid_header` | 400 |
/// | [`TokenExpired`][Self::TokenExpired] | `token_expired` | 401 |
/// | [`InvalidClaims`][Self::InvalidClaims] | `invalid_claims` | 401 |
/// | [`TokenUnparseable`][Self::TokenUnparseable] | `invalid_header` | 401 |
/// | [`PermissionsClaimMissing`][Self::PermissionsClaimMissing] | `invalid_claims` | 400 |
/// | [`PermissionDenied`][Self::PermissionDenied] | `unauthorized` | 403 |
/// | [`Unauthorized`][Self::Unauthorized] | `unauthorized` | 401 |
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization` header was presented
    #[error("Authorization header is expected.")]
    AuthorizationHeaderMissing,

    /// The `Authorization` header is not a usable bearer credential
    #[error("{0}")]
    InvalidHeader(InvalidHeader),

    /// The identity provider's key set could not be retrieved
    #[error("Unable to fetch the signing keys.")]
    KeySetUnavailable(#[source] KeySetError),

    /// No key in the key set matches the token's key identifier
    #[error("Unable to find the appropriate key.")]
    SigningKeyNotFound,

    /// The token's `exp` claim is in the past
    #[error("Token expired.")]
    TokenExpired,

    /// The signature, audience, issuer or another required claim was rejected
    #[error("Incorrect claims. Please, check the audience and issuer.")]
    InvalidClaims(#[source] JwtVerifyError),

    /// The token could not be parsed
    #[error("Unable to parse authentication token.")]
    TokenUnparseable(#[source] JwtVerifyError),

    /// The verified token carries no `permissions` claim
    #[error("Permissions not included in JWT.")]
    PermissionsClaimMissing,

    /// The verified token does not grant the required permission
    #[error("Permission not found.")]
    PermissionDenied,

    /// Token verification failed for an undisclosed reason
    #[error("Could not process token.")]
    Unauthorized,
}

impl AuthError {
    /// The machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationHeaderMissing => "authorization_header_missing",
            Self::InvalidHeader(_) | Self::SigningKeyNotFound | Self::TokenUnparseable(_) => {
                "invalid_header"
            }
            Self::KeySetUnavailable(_) => "key_set_unavailable",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims(_) | Self::PermissionsClaimMissing => "invalid_claims",
            Self::PermissionDenied | Self::Unauthorized => "unauthorized",
        }
    }

    /// The human-readable description
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// The HTTP status associated with the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::SigningKeyNotFound | Self::PermissionsClaimMissing => StatusCode::BAD_REQUEST,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Serializes as `{"code": ..., "description": ..., "status": ...}`
impl Serialize for AuthError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AuthError", 3)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("description", &self.description())?;
        s.serialize_field("status", &self.status().as_u16())?;
        s.end()
    }
}
