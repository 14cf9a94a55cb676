//! Configuration for a single identity provider tenant

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tollgate::{
    jwa,
    jwt::{self, Audience, AudienceRef, Issuer},
};
use url::Url;

use crate::claims::ClientIdRef;

/// Default lifetime of a cached key set
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound on a single key set request
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(5);

/// Default shortest time between two key set fetches prompted by an unknown key id
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How much detail about a failed token verification reaches the caller
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDetail {
    /// Every verification failure is reported as `unauthorized`
    #[default]
    Terse,
    /// The specific verification failure is reported
    Verbose,
}

/// Settings for verifying tokens issued by one identity provider tenant
///
/// Only the domain and audience are required. Everything else defaults to the
/// conventions of a hosted tenant: the issuer is `https://{domain}/`, keys are
/// published at `https://{domain}/.well-known/jwks.json`, and tokens are
/// signed with `RS256`.
///
/// ```
/// use std::time::Duration;
/// use tollgate_oauth2::AuthConfig;
///
/// let config = AuthConfig::new("tenant.example.com", "image")
///     .with_leeway(Duration::from_secs(30));
///
/// assert_eq!(config.issuer().as_str(), "https://tenant.example.com/");
/// assert_eq!(config.jwks_url(), "https://tenant.example.com/.well-known/jwks.json");
/// ```
///
/// It can also be loaded from any serde data source:
///
/// ```
/// use tollgate_oauth2::{AuthConfig, ErrorDetail};
///
/// let config: AuthConfig = serde_json::from_str(r#"{
///     "domain": "tenant.example.com",
///     "audience": "image",
///     "jwks_cache_ttl_secs": 0,
///     "error_detail": "verbose"
/// }"#).unwrap();
///
/// assert_eq!(config.jwks_cache_ttl().as_secs(), 0);
/// assert_eq!(config.error_detail(), ErrorDetail::Verbose);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[must_use]
pub struct AuthConfig {
    domain: String,
    audience: Audience,
    #[serde(default)]
    issuer: Option<Issuer>,
    #[serde(default = "default_algorithms")]
    algorithms: Vec<jwa::Algorithm>,
    #[serde(default, rename = "leeway_secs", deserialize_with = "seconds")]
    leeway: Duration,
    #[serde(default)]
    jwks_url: Option<String>,
    #[serde(
        default = "default_cache_ttl",
        rename = "jwks_cache_ttl_secs",
        deserialize_with = "seconds"
    )]
    jwks_cache_ttl: Duration,
    #[serde(
        default = "default_timeout",
        rename = "jwks_timeout_secs",
        deserialize_with = "seconds"
    )]
    jwks_timeout: Duration,
    #[serde(
        default = "default_min_refresh_interval",
        rename = "jwks_min_refresh_interval_secs",
        deserialize_with = "seconds"
    )]
    jwks_min_refresh_interval: Duration,
    #[serde(default)]
    error_detail: ErrorDetail,
}

fn default_algorithms() -> Vec<jwa::Algorithm> {
    vec![jwa::Algorithm::RS256]
}

const fn default_cache_ttl() -> Duration {
    DEFAULT_JWKS_CACHE_TTL
}

const fn default_timeout() -> Duration {
    DEFAULT_JWKS_TIMEOUT
}

const fn default_min_refresh_interval() -> Duration {
    DEFAULT_JWKS_MIN_REFRESH_INTERVAL
}

/// Durations are written as whole seconds in configuration sources
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl AuthConfig {
    /// Configuration for the given tenant domain and expected audience
    pub fn new(domain: impl Into<String>, audience: impl Into<Audience>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            issuer: None,
            algorithms: default_algorithms(),
            leeway: Duration::ZERO,
            jwks_url: None,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            jwks_timeout: DEFAULT_JWKS_TIMEOUT,
            jwks_min_refresh_interval: DEFAULT_JWKS_MIN_REFRESH_INTERVAL,
            error_detail: ErrorDetail::Terse,
        }
    }

    /// Overrides the expected issuer
    pub fn with_issuer(self, issuer: impl Into<Issuer>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Replaces the approved signing algorithms
    pub fn with_algorithms(self, algorithms: impl IntoIterator<Item = jwa::Algorithm>) -> Self {
        Self {
            algorithms: algorithms.into_iter().collect(),
            ..self
        }
    }

    /// Allows a grace period around `exp` and `nbf`
    ///
    /// Token times have one-second resolution, so the fractional part of
    /// `leeway` has no effect on validation.
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Overrides the key set location
    pub fn with_jwks_url(self, url: impl Into<String>) -> Self {
        Self {
            jwks_url: Some(url.into()),
            ..self
        }
    }

    /// Sets how long a fetched key set is reused; zero disables caching
    pub fn with_cache_ttl(self, ttl: Duration) -> Self {
        Self {
            jwks_cache_ttl: ttl,
            ..self
        }
    }

    /// Sets the bound on a single key set request
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            jwks_timeout: timeout,
            ..self
        }
    }

    /// Sets the shortest time between two key set fetches prompted by a
    /// token naming an unknown key; zero allows a fetch for every such token
    pub fn with_min_refresh_interval(self, interval: Duration) -> Self {
        Self {
            jwks_min_refresh_interval: interval,
            ..self
        }
    }

    /// Sets how much verification detail reaches callers
    pub fn with_error_detail(self, error_detail: ErrorDetail) -> Self {
        Self {
            error_detail,
            ..self
        }
    }

    /// The tenant domain, such as `tenant.example.com`
    #[must_use]
    pub fn domain(&self) -> &str {
        self.domain.trim_end_matches('/')
    }

    /// The audience tokens must be issued for
    #[must_use]
    pub fn audience(&self) -> &AudienceRef {
        &self.audience
    }

    /// The issuer tokens must carry
    pub fn issuer(&self) -> Issuer {
        self.issuer
            .clone()
            .unwrap_or_else(|| Issuer::new(format!("https://{}/", self.domain())))
    }

    /// The approved signing algorithms
    #[must_use]
    pub fn algorithms(&self) -> &[jwa::Algorithm] {
        &self.algorithms
    }

    /// The grace period around `exp`
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// The key set location
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", self.domain()))
    }

    /// How long a fetched key set is reused
    #[must_use]
    pub fn jwks_cache_ttl(&self) -> Duration {
        self.jwks_cache_ttl
    }

    /// The bound on a single key set request
    #[must_use]
    pub fn jwks_timeout(&self) -> Duration {
        self.jwks_timeout
    }

    /// The shortest time between two key set fetches prompted by an unknown key id
    #[must_use]
    pub fn jwks_min_refresh_interval(&self) -> Duration {
        self.jwks_min_refresh_interval
    }

    /// How much verification detail reaches callers
    #[must_use]
    pub fn error_detail(&self) -> ErrorDetail {
        self.error_detail
    }

    /// The claim validator implied by this configuration
    ///
    /// `sub` and `iat` are always required, alongside the audience, issuer and
    /// an unexpired `exp`.
    pub fn validator(&self) -> jwt::ClaimsValidator {
        jwt::ClaimsValidator::default()
            .extend_approved_algorithms(self.algorithms.iter().copied())
            .add_allowed_audience(self.audience.clone())
            .require_issuer(self.issuer())
            .with_leeway(self.leeway())
            .require_subject()
            .require_issued_at()
    }

    /// The tenant's login page for the implicit flow
    ///
    /// After login the tenant redirects to `redirect_uri` with the access
    /// token in the URL fragment.
    ///
    /// ```
    /// use tollgate_oauth2::{AuthConfig, ClientIdRef};
    ///
    /// let config = AuthConfig::new("tenant.example.com", "image");
    /// let url = config
    ///     .authorize_url(ClientIdRef::from_str("abc123"), "http://localhost:8080/login-results")
    ///     .unwrap();
    ///
    /// assert_eq!(
    ///     url.as_str(),
    ///     "https://tenant.example.com/authorize?audience=image&response_type=token\
    ///      &client_id=abc123&redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Flogin-results"
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// The configured domain does not form a valid URL.
    pub fn authorize_url(
        &self,
        client_id: &ClientIdRef,
        redirect_uri: &str,
    ) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &format!("https://{}/authorize", self.domain()),
            &[
                ("audience", self.audience.as_str()),
                ("response_type", "token"),
                ("client_id", client_id.as_str()),
                ("redirect_uri", redirect_uri),
            ],
        )
    }
}
