//! Bearer token authorization against an identity provider's published keys
//!
//! An [`Authority`] verifies access tokens issued by one identity provider
//! tenant. It fetches the tenant's JSON Web Key Set through a
//! [`KeySetFetcher`], checks the token's signature, and then checks its
//! expiry, audience and issuer. A [`Guard`] puts token extraction,
//! verification and a [`PermissionPolicy`] together, and [`requires_auth`]
//! wraps an operation so that it only runs for authorized callers.
//!
//! ```no_run
//! use tollgate_oauth2::{AuthConfig, Authority, Guard};
//!
//! # async fn handle(authorization: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new("tenant.example.com", "image");
//! let authority = Authority::from_config(&config)?;
//! let guard = Guard::new(authority, "get:images".parse()?);
//!
//! let claims = guard.authorize(authorization).await?;
//! println!("hello, {}", claims.subject());
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! This crate enables `reqwest`'s native TLS support by default. Disable
//! default features and enable `rustls-tls` to use `rustls` instead.

#![cfg_attr(docsrs, feature(doc_cfg))]
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

mod authority;
pub mod bearer;
mod claims;
mod config;
mod error;
mod guard;
mod jwks;
mod permission;

pub use authority::Authority;
pub use claims::{Claims, ClientId, ClientIdRef};
pub use config::{
    AuthConfig, ErrorDetail, DEFAULT_JWKS_CACHE_TTL, DEFAULT_JWKS_MIN_REFRESH_INTERVAL,
    DEFAULT_JWKS_TIMEOUT,
};
pub use error::{AuthError, InvalidHeader};
pub use guard::{requires_auth, Guard, RequiresAuth};
pub use jwks::{KeySetError, KeySetFetcher, KeySetFetcherBuilder};
pub use permission::{
    check_permissions, InvalidPermission, Permission, PermissionPolicy, PermissionRef,
    Permissions,
};
