//! Bearer challenge responses (RFC 6750, section 3)
//!
//! Every response built here carries a `www-authenticate` header of the form
//!
//! ```text
//! Bearer error="<code>" error_description="<description>" scope="<permission>"
//! ```
//!
//! where the description is escaped and dropped when empty, and the scope
//! appears only on `403` responses that know which permission was missing.

use http::{header, HeaderValue, Response, StatusCode};
use tollgate_oauth2::PermissionRef;

/// A `401` response with an `invalid_token` challenge
pub fn unauthorized<Body: Default>(description: &str) -> Response<Body> {
    challenge(StatusCode::UNAUTHORIZED, "invalid_token", description, None)
}

/// A `403` response with an `insufficient_scope` challenge naming `missing`
pub fn forbidden<Body: Default>(
    description: &str,
    missing: Option<&PermissionRef>,
) -> Response<Body> {
    challenge(
        StatusCode::FORBIDDEN,
        "insufficient_scope",
        description,
        missing,
    )
}

/// A `400` response with an `invalid_request` challenge
pub fn bad_request<Body: Default>(description: &str) -> Response<Body> {
    challenge(StatusCode::BAD_REQUEST, "invalid_request", description, None)
}

fn challenge<Body: Default>(
    status: StatusCode,
    code: &'static str,
    description: &str,
    scope: Option<&PermissionRef>,
) -> Response<Body> {
    use std::fmt::Write as _;

    let mut value = format!(r#"Bearer error="{code}""#);
    if !description.is_empty() {
        write!(value, r#" error_description="{}""#, description.escape_default())
            .expect("writing to a String cannot fail");
    }
    // permissions never contain quotes, backslashes or whitespace
    if let Some(scope) = scope {
        write!(value, r#" scope="{scope}""#).expect("writing to a String cannot fail");
    }

    let mut response = Response::new(Body::default());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::try_from(value).expect("escaped challenge is a valid header value"),
    );
    response
}
