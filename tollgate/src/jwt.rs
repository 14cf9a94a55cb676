//! Compact JSON Web Tokens ([RFC7519][])
//!
//! A token travels as `header.payload.signature`, each section base64url
//! encoded. Verification is split in two steps. [`JwtRef::decompose`] only
//! decodes the header, which names the algorithm and key id needed to pick a
//! verification key. [`Decomposed::verify`] then checks the signature with
//! that key, decodes the payload, and hands the claims to a
//! [`ClaimsValidator`]. Nothing in the payload is looked at before the
//! signature has been checked.
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use std::{fmt, time::Duration};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{
    b64::Base64Url,
    clock::{Clock, System, UnixTime},
    error::{self, ClaimsRejected, MalformedToken, Section},
    jwa, jwk, jws,
};

/// A bearer token in compact serialization
///
/// Formatting a token with `{}` or `{:?}` prints `***JWT***`. The alternate
/// flag opts in to seeing it: `{:#}` prints the whole token and `{:#?}`
/// prints it without the signature.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "A borrowed reference to a [`Jwt`]"
)]
#[must_use]
pub struct Jwt;

const REDACTED: &str = "***JWT***";

impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !f.alternate() {
            return f.write_str(REDACTED);
        }

        match self.0.rfind('.') {
            Some(end) => write!(f, "\"{}…\"", &self.0[..=end]),
            None => f.write_str("\"…\""),
        }
    }
}

impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str(&self.0)
        } else {
            f.write_str(REDACTED)
        }
    }
}

impl JwtRef {
    /// Splits the token into its sections and decodes the header
    ///
    /// # Errors
    ///
    /// The token is not three dot-separated sections, the header or
    /// signature is not base64url, or the header does not deserialize
    /// into `H`.
    pub fn decompose<H>(&self) -> Result<Decomposed<'_, H>, error::JwtVerifyError>
    where
        H: for<'de> Deserialize<'de>,
    {
        let mut sections = self.0.splitn(4, '.');
        let (header, payload, signature) =
            match (sections.next(), sections.next(), sections.next(), sections.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(MalformedToken::SectionCount.into()),
            };
        let signed = &self.0[..header.len() + 1 + payload.len()];

        let header = Base64Url::from_encoded(header).map_err(error::malformed(Section::Header))?;
        let header: H =
            serde_json::from_slice(header.as_slice()).map_err(error::malformed(Section::Header))?;
        let signature =
            Base64Url::from_encoded(signature).map_err(error::malformed(Section::Signature))?;

        Ok(Decomposed {
            header,
            signed,
            payload,
            signature,
        })
    }
}

#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
impl Jwt {
    /// Serializes `header` and `payload` and signs them with `key`
    ///
    /// # Errors
    ///
    /// Either section fails to serialize, or the key fails to sign.
    pub fn sign<H, P, S>(header: &H, payload: &P, key: &S) -> Result<Self, error::JwtSigningError>
    where
        H: Serialize + JoseHeader,
        P: Serialize,
        S: jws::Signer,
        error::JwtSigningError: From<S::Error>,
    {
        fn encode<T: Serialize>(
            section: Section,
            value: &T,
        ) -> Result<Base64Url, error::JwtSigningError> {
            serde_json::to_vec(value)
                .map(Base64Url::from_raw)
                .map_err(|source| error::JwtSigningError::Serialization { section, source })
        }

        let mut token = format!(
            "{}.{}",
            encode(Section::Header, header)?,
            encode(Section::Payload, payload)?
        );
        let signature = Base64Url::from_raw(key.sign(header.alg(), token.as_bytes())?);
        token.push('.');
        token.push_str(&signature.to_string());

        Ok(Self::new(token))
    }
}

/// The fields of a JOSE header needed to pick a verification key
pub trait JoseHeader {
    /// The signing algorithm (`alg`)
    fn alg(&self) -> jwa::Algorithm;

    /// The signing key's identifier (`kid`), if the header names one
    fn kid(&self) -> Option<&jwk::KeyIdRef>;
}

/// The registered claims a [`ClaimsValidator`] checks
pub trait RegisteredClaims {
    /// Expiration time (`exp`)
    fn exp(&self) -> Option<UnixTime>;

    /// Not before (`nbf`)
    fn nbf(&self) -> Option<UnixTime>;

    /// Issued at (`iat`)
    fn iat(&self) -> Option<UnixTime>;

    /// Audiences (`aud`)
    fn aud(&self) -> &Audiences;

    /// Issuer (`iss`)
    fn iss(&self) -> Option<&IssuerRef>;

    /// Subject (`sub`)
    fn sub(&self) -> Option<&SubjectRef>;
}

/// A token split into sections, with only its header decoded
///
/// The header has not been authenticated yet. Use it to select a key and
/// nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, H = BasicHeaders> {
    header: H,
    signed: &'a str,
    payload: &'a str,
    signature: Base64Url,
}

impl<'a, H: JoseHeader> Decomposed<'a, H> {
    /// The algorithm the header claims the token was signed with
    pub fn alg(&self) -> jwa::Algorithm {
        self.header.alg()
    }

    /// The key id the header claims the token was signed with
    pub fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }

    /// The still encoded payload
    pub fn encoded_payload(&self) -> &'a str {
        self.payload
    }

    /// The decoded signature
    pub fn signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    /// Verifies the token against `key` and `validator` using the system clock
    ///
    /// # Errors
    ///
    /// See [`verify_with_clock`][Self::verify_with_clock].
    pub fn verify<C, V>(
        self,
        key: &V,
        validator: &ClaimsValidator,
    ) -> Result<Verified<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        V: jws::Verifier,
        error::JwtVerifyError: From<V::Error>,
    {
        self.verify_with_clock(key, validator, &System)
    }

    /// Verifies the token against `key` and `validator` at the time `clock` reports
    ///
    /// The algorithm must be approved before the key is used. The payload is
    /// decoded only once the signature matches, and the claims are validated
    /// last.
    ///
    /// # Errors
    ///
    /// The first of these checks to fail.
    pub fn verify_with_clock<C, V, K>(
        self,
        key: &V,
        validator: &ClaimsValidator,
        clock: &K,
    ) -> Result<Verified<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + RegisteredClaims,
        V: jws::Verifier,
        error::JwtVerifyError: From<V::Error>,
        K: Clock,
    {
        let alg = self.header.alg();
        if !validator.approves(alg) {
            return Err(ClaimsRejected::InvalidAlgorithm.into());
        }

        key.verify(alg, self.signed.as_bytes(), self.signature.as_slice())?;

        let payload =
            Base64Url::from_encoded(self.payload).map_err(error::malformed(Section::Payload))?;
        let claims: C = serde_json::from_slice(payload.as_slice())
            .map_err(error::malformed(Section::Payload))?;

        validator.validate_with_clock(&claims, clock)?;

        Ok(Verified {
            header: self.header,
            claims,
        })
    }
}

/// A header and claims whose signature and claims have been checked
///
/// Only [`Decomposed::verify`] produces values of this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verified<C = BasicClaims, H = BasicHeaders> {
    header: H,
    claims: C,
}

impl<C, H> Verified<C, H> {
    /// The verified claims
    pub fn claims(&self) -> &C {
        &self.claims
    }

    /// Splits into header and claims
    pub fn into_parts(self) -> (H, C) {
        (self.header, self.claims)
    }
}

/// An intended recipient of a token
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// The party that issued a token
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The principal a token was issued about
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// The `aud` claim
///
/// Providers send either a single string or an array of strings; both
/// forms are accepted. A single audience is written back as a string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AudienceClaim", into = "AudienceClaim")]
#[must_use]
pub struct Audiences(Vec<Audience>);

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
    Single(Audience),
    List(Vec<Audience>),
}

impl From<AudienceClaim> for Audiences {
    fn from(claim: AudienceClaim) -> Self {
        match claim {
            AudienceClaim::Single(aud) => Self(vec![aud]),
            AudienceClaim::List(list) => Self(list),
        }
    }
}

impl From<Audiences> for AudienceClaim {
    fn from(Audiences(mut list): Audiences) -> Self {
        if list.len() == 1 {
            list.pop().map_or(Self::List(Vec::new()), Self::Single)
        } else {
            Self::List(list)
        }
    }
}

impl Audiences {
    /// No audiences
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether there are no audiences
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The audiences, in claim order
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(|aud| &**aud)
    }

    /// Whether `aud` is one of the audiences
    #[must_use]
    pub fn contains(&self, aud: &AudienceRef) -> bool {
        self.iter().any(|a| a == aud)
    }
}

/// Checks the registered claims of a token whose signature matched
///
/// A default validator approves no algorithm, so every token is rejected
/// until at least one is added. Expiry is always required. A `nbf` claim
/// is honoured when present.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct ClaimsValidator {
    algorithms: Vec<jwa::Algorithm>,
    audiences: Vec<Audience>,
    issuer: Option<Issuer>,
    leeway: Duration,
    require_sub: bool,
    require_iat: bool,
}

impl ClaimsValidator {
    /// Approves tokens signed with `alg`
    pub fn add_approved_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.algorithms.push(alg);
        self
    }

    /// Approves tokens signed with any of `algs`
    pub fn extend_approved_algorithms(
        mut self,
        algs: impl IntoIterator<Item = jwa::Algorithm>,
    ) -> Self {
        self.algorithms.extend(algs);
        self
    }

    /// Accepts tokens issued for `audience`
    ///
    /// With no allowed audience, the `aud` claim is not checked.
    pub fn add_allowed_audience(mut self, audience: Audience) -> Self {
        self.audiences.push(audience);
        self
    }

    /// Accepts only tokens issued by `issuer`
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Tolerates this much clock skew around `exp` and `nbf`
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Rejects tokens without a `sub` claim
    pub fn require_subject(self) -> Self {
        Self {
            require_sub: true,
            ..self
        }
    }

    /// Rejects tokens without an `iat` claim
    pub fn require_issued_at(self) -> Self {
        Self {
            require_iat: true,
            ..self
        }
    }

    /// Whether tokens signed with `alg` are acceptable
    #[must_use]
    pub fn approves(&self, alg: jwa::Algorithm) -> bool {
        self.algorithms.contains(&alg)
    }

    /// Validates `claims` at the current system time
    ///
    /// # Errors
    ///
    /// See [`validate_with_clock`][Self::validate_with_clock].
    pub fn validate(&self, claims: &impl RegisteredClaims) -> Result<(), ClaimsRejected> {
        self.validate_with_clock(claims, &System)
    }

    /// Validates `claims` at the time `clock` reports
    ///
    /// Checks run in this order: expiry, not-before, audience, issuer, and
    /// then the presence of `sub` and `iat` when required.
    ///
    /// # Errors
    ///
    /// The first check that fails.
    pub fn validate_with_clock(
        &self,
        claims: &impl RegisteredClaims,
        clock: &impl Clock,
    ) -> Result<(), ClaimsRejected> {
        let now = clock.now();

        let exp = claims
            .exp()
            .ok_or(ClaimsRejected::MissingRequiredClaim("exp"))?;
        if exp < now.saturating_sub(self.leeway) {
            return Err(ClaimsRejected::TokenExpired);
        }

        if matches!(claims.nbf(), Some(nbf) if nbf > now.saturating_add(self.leeway)) {
            return Err(ClaimsRejected::TokenNotYetValid);
        }

        if !self.audiences.is_empty() {
            let aud = claims.aud();
            if aud.is_empty() {
                return Err(ClaimsRejected::MissingRequiredClaim("aud"));
            }
            if !self.audiences.iter().any(|allowed| aud.contains(allowed)) {
                return Err(ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(expected) = &self.issuer {
            let iss = claims
                .iss()
                .ok_or(ClaimsRejected::MissingRequiredClaim("iss"))?;
            if iss != expected {
                return Err(ClaimsRejected::InvalidIssuer);
            }
        }

        if self.require_sub && claims.sub().is_none() {
            return Err(ClaimsRejected::MissingRequiredClaim("sub"));
        }
        if self.require_iat && claims.iat().is_none() {
            return Err(ClaimsRejected::MissingRequiredClaim("iat"));
        }

        Ok(())
    }
}

/// A header carrying only `alg` and `kid`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct BasicHeaders {
    alg: jwa::Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<jwk::KeyId>,
}

impl BasicHeaders {
    /// A header naming only the algorithm
    pub const fn new(alg: jwa::Algorithm) -> Self {
        Self { alg, kid: None }
    }

    /// A header naming the algorithm and the signing key
    pub fn with_key_id(alg: jwa::Algorithm, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            alg,
            kid: Some(kid.into()),
        }
    }
}

impl JoseHeader for BasicHeaders {
    fn alg(&self) -> jwa::Algorithm {
        self.alg
    }

    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// The registered claims, each optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct BasicClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
}

impl BasicClaims {
    /// No claims at all
    pub const fn new() -> Self {
        Self {
            iss: None,
            aud: Audiences::empty(),
            sub: None,
            iat: None,
            nbf: None,
            exp: None,
        }
    }

    /// Sets `iss`
    pub fn with_issuer(self, iss: impl Into<Issuer>) -> Self {
        Self {
            iss: Some(iss.into()),
            ..self
        }
    }

    /// Sets `aud` to a single audience
    pub fn with_audience(self, aud: impl Into<Audience>) -> Self {
        Self {
            aud: Audiences(vec![aud.into()]),
            ..self
        }
    }

    /// Sets `sub`
    pub fn with_subject(self, sub: impl Into<Subject>) -> Self {
        Self {
            sub: Some(sub.into()),
            ..self
        }
    }

    /// Sets `iat`
    pub fn with_issued_at(self, iat: UnixTime) -> Self {
        Self {
            iat: Some(iat),
            ..self
        }
    }

    /// Sets `nbf`
    pub fn with_not_before(self, nbf: UnixTime) -> Self {
        Self {
            nbf: Some(nbf),
            ..self
        }
    }

    /// Sets `exp`
    pub fn with_expiration(self, exp: UnixTime) -> Self {
        Self {
            exp: Some(exp),
            ..self
        }
    }
}

impl RegisteredClaims for BasicClaims {
    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn iat(&self) -> Option<UnixTime> {
        self.iat
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}
