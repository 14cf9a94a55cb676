//! Request authorization: bearer extraction, verification, then the permission gate

use std::{fmt, future::Future};

use tollgate::JwtRef;

use crate::{bearer, check_permissions, AuthError, Authority, Claims, ErrorDetail, PermissionPolicy};

/// Authenticates a request and checks its permissions
///
/// A guard runs three steps in order, stopping at the first failure:
///
/// 1. extract the bearer token from the `Authorization` header
/// 2. verify the token with the [`Authority`]
/// 3. check the verified claims against the [`PermissionPolicy`]
///
/// Failures from the second step are reported as
/// [`AuthError::Unauthorized`] unless the guard uses
/// [`ErrorDetail::Verbose`]. The specific failure is always logged at the
/// `debug` level.
#[derive(Clone, Debug)]
#[must_use]
pub struct Guard {
    authority: Authority,
    policy: PermissionPolicy,
    error_detail: ErrorDetail,
}

impl Guard {
    /// A guard enforcing `policy` on tokens verified by `authority`
    ///
    /// The guard discloses as much verification detail as the authority is
    /// configured to.
    pub fn new(authority: Authority, policy: PermissionPolicy) -> Self {
        let error_detail = authority.error_detail();
        Self {
            authority,
            policy,
            error_detail,
        }
    }

    /// Overrides how much verification detail the guard discloses
    pub fn with_error_detail(self, error_detail: ErrorDetail) -> Self {
        Self {
            error_detail,
            ..self
        }
    }

    /// The authority used to verify tokens
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// The permission policy enforced after verification
    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Authorizes a request given the raw value of its `Authorization` header
    ///
    /// # Errors
    ///
    /// Any extraction, verification or permission failure.
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<Claims, AuthError> {
        let token = bearer::extract_token(authorization)?;
        self.authorize_token(&token).await
    }

    /// Authorizes an already extracted bearer token
    ///
    /// # Errors
    ///
    /// Any verification or permission failure.
    pub async fn authorize_token(&self, token: &JwtRef) -> Result<Claims, AuthError> {
        let claims = self.authority.verify(token).await.map_err(|err| {
            tracing::debug!(
                code = err.code(),
                status = err.status().as_u16(),
                description = %err,
                "token verification failed"
            );
            match self.error_detail {
                ErrorDetail::Terse => AuthError::Unauthorized,
                ErrorDetail::Verbose => err,
            }
        })?;

        check_permissions(&self.policy, &claims)?;

        tracing::trace!(sub = %claims.subject(), "request authorized");
        Ok(claims)
    }
}

/// Wraps `operation` so that it only runs for authorized requests
///
/// The verified claims are passed to the operation ahead of its own
/// arguments.
///
/// ```
/// use tollgate_oauth2::{
///     requires_auth, AuthConfig, AuthError, Authority, Claims, Guard, KeySetFetcher,
///     PermissionPolicy,
/// };
/// use tollgate::Jwks;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::new("tenant.example.com", "image");
/// let authority = Authority::new(KeySetFetcher::from_jwks(Jwks::default()), config.validator());
///
/// let get_images = requires_auth(
///     Guard::new(authority, "get:images".parse()?),
///     |claims: Claims, page: u32| async move {
///         Ok::<_, AuthError>(format!("page {page} for {}", claims.subject()))
///     },
/// );
///
/// let result = get_images.call(None, 1).await;
/// assert!(matches!(result, Err(AuthError::AuthorizationHeaderMissing)));
/// # Ok(())
/// # }
/// ```
pub fn requires_auth<F>(guard: Guard, operation: F) -> RequiresAuth<F> {
    RequiresAuth { guard, operation }
}

/// An operation guarded by [`requires_auth`]
#[derive(Clone)]
#[must_use]
pub struct RequiresAuth<F> {
    guard: Guard,
    operation: F,
}

impl<F> fmt::Debug for RequiresAuth<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RequiresAuth")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl<F> RequiresAuth<F> {
    /// The guard protecting the operation
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Authorizes the request and, only on success, runs the operation
    ///
    /// # Errors
    ///
    /// The authorization failure, converted into the operation's error type,
    /// or the operation's own error.
    pub async fn call<A, Fut, T, E>(&self, authorization: Option<&str>, args: A) -> Result<T, E>
    where
        F: Fn(Claims, A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthError>,
    {
        let claims = self.guard.authorize(authorization).await?;
        (self.operation)(claims, args).await
    }
}
