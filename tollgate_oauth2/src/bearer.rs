//! Extraction of bearer tokens from the `Authorization` header

use http::{header, HeaderMap};
use tollgate::Jwt;

use crate::{error::InvalidHeader, AuthError};

/// Extracts the bearer token from the raw value of an `Authorization` header
///
/// The value is split on whitespace and must consist of exactly the scheme
/// `Bearer` (in any case) followed by a single token. The token is returned
/// without being parsed.
///
/// ```
/// use tollgate_oauth2::{bearer, AuthError};
///
/// let token = bearer::extract_token(Some("Bearer abc.def.ghi")).unwrap();
/// assert_eq!(token.as_str(), "abc.def.ghi");
///
/// assert!(matches!(
///     bearer::extract_token(None),
///     Err(AuthError::AuthorizationHeaderMissing)
/// ));
/// ```
///
/// # Errors
///
/// * [`AuthError::AuthorizationHeaderMissing`] when the value is absent or blank
/// * [`AuthError::InvalidHeader`] when the scheme is not `Bearer`, the token
///   is missing, or there are extra parts
pub fn extract_token(authorization: Option<&str>) -> Result<Jwt, AuthError> {
    let authorization = authorization
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(AuthError::AuthorizationHeaderMissing)?;

    let mut parts = authorization.split_whitespace();
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next();
    let extra = parts.next();

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidHeader(InvalidHeader::MissingBearerScheme));
    }

    match (token, extra) {
        (Some(token), None) => {
            tracing::trace!("extracted bearer token");
            Ok(Jwt::from(token))
        }
        (None, _) => Err(AuthError::InvalidHeader(InvalidHeader::TokenNotFound)),
        (Some(_), Some(_)) => Err(AuthError::InvalidHeader(InvalidHeader::NotBearerToken)),
    }
}

/// Extracts the bearer token from a request's headers
///
/// Only the first `Authorization` header is considered.
///
/// # Errors
///
/// As [`extract_token`], and additionally [`AuthError::InvalidHeader`] when
/// the header value is not visible ASCII.
pub fn extract_from_headers(headers: &HeaderMap) -> Result<Jwt, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .map(|v| {
            v.to_str()
                .map_err(|_| AuthError::InvalidHeader(InvalidHeader::Malformed))
        })
        .transpose()?;

    extract_token(value)
}
