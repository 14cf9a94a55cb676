//! Axum extractors that only admit requests carrying a verified bearer token
//! with the expected permission.
//!
//! Guards are declared with [`permission_guard!`] or [`permission_guards!`]
//! and read the [`Authority`][tollgate_oauth2::Authority] from the router
//! state. A rejected request is answered with an [`AuthRejection`].
//!
//! # Full Example
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use tollgate_oauth2::{AuthConfig, Authority};
//!
//! mod guard {
//!     tollgate_axum::permission_guards! {
//!         pub permission GetImages = "get:images";
//!         pub permission PostImages = "post:images";
//!         pub permission Authenticated = *;
//!     }
//! }
//!
//! async fn list_images(guard::GetImages(claims): guard::GetImages) -> String {
//!     format!("images for {}", claims.subject())
//! }
//!
//! async fn whoami(guard: guard::Authenticated) -> String {
//!     guard.claims().subject().to_string()
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new("tenant.example.com", "image");
//!     let authority = Authority::from_config(&config)?;
//!
//!     let router = Router::new()
//!         .route("/images", get(list_images))
//!         .route("/whoami", get(whoami))
//!         .with_state(authority);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{error::Error, fmt};

use axum_core::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use tollgate_oauth2::{AuthError, PermissionPolicy};

mod macros;
pub mod util;

/// Defines the permission policy for a given endpoint guard
pub trait EndpointPermissionPolicy {
    /// The permission policy enforced when this type is used as an endpoint guard
    fn permission_policy() -> &'static PermissionPolicy;
}

/// A request rejected by an endpoint guard
///
/// Responds with the status of the underlying [`AuthError`], a JSON body of
/// the form
///
/// ```json
/// { "success": false, "error": 401, "message": { "code": "...", "description": "..." } }
/// ```
///
/// and a `www-authenticate` challenge for `401`, `403` and `400` responses.
#[derive(Debug)]
pub struct AuthRejection {
    error: AuthError,
    policy: Option<&'static PermissionPolicy>,
}

impl AuthRejection {
    /// A rejection for the given error
    #[must_use]
    pub fn new(error: AuthError) -> Self {
        Self {
            error,
            policy: None,
        }
    }

    /// Names the policy that was not satisfied in the `www-authenticate` challenge
    #[must_use]
    pub fn with_policy(self, policy: &'static PermissionPolicy) -> Self {
        Self {
            policy: Some(policy),
            ..self
        }
    }

    /// The underlying authorization error
    #[must_use]
    pub fn error(&self) -> &AuthError {
        &self.error
    }

    /// Unwraps the underlying authorization error
    #[must_use]
    pub fn into_error(self) -> AuthError {
        self.error
    }
}

impl From<AuthError> for AuthRejection {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl Error for AuthRejection {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: u16,
    message: ErrorMessage<'a>,
}

#[derive(Serialize)]
struct ErrorMessage<'a> {
    code: &'a str,
    description: &'a str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let description = self.error.description();

        let mut resp = match status {
            StatusCode::UNAUTHORIZED => util::unauthorized::<Body>(&description),
            StatusCode::FORBIDDEN => {
                util::forbidden::<Body>(&description, self.policy.and_then(|p| p.required()))
            }
            StatusCode::BAD_REQUEST => util::bad_request::<Body>(&description),
            _ => {
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = status;
                resp
            }
        };

        let body = ErrorBody {
            success: false,
            error: status.as_u16(),
            message: ErrorMessage {
                code: self.error.code(),
                description: &description,
            },
        };

        let body = serde_json::to_vec(&body).expect("error body is always serializable");
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        *resp.body_mut() = Body::from(body);
        resp
    }
}

#[doc(hidden)]
pub mod __private {
    pub use axum_core::extract::{FromRef, FromRequestParts};
    pub use http::request::Parts;
    pub use once_cell::sync::OnceCell;
    pub use tollgate_oauth2::{Authority, Claims, PermissionPolicy};
    use tollgate_oauth2::{bearer, Guard};

    use crate::AuthRejection;

    pub async fn authorize<S>(
        parts: &Parts,
        state: &S,
        policy: &'static PermissionPolicy,
    ) -> Result<Claims, AuthRejection>
    where
        Authority: FromRef<S>,
    {
        let token = bearer::extract_from_headers(&parts.headers)?;
        let guard = Guard::new(Authority::from_ref(state), policy.clone());

        guard
            .authorize_token(&token)
            .await
            .map_err(|err| AuthRejection::new(err).with_policy(policy))
    }
}
