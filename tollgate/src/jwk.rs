//! Published verification keys ([RFC7517][])
//!
//! Only RSA keys are understood. A key may pin itself to one algorithm
//! (`alg`) or one usage (`use`); a pinned key refuses to verify anything
//! else.
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use std::convert::TryFrom;

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{error, jwa, jws};

/// The `kid` a key set publishes a key under
#[braid(serde, ref_doc = "A borrowed reference to a [`KeyId`]")]
pub struct KeyId;

/// An RSA public key as published in a key set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JwkDto", into = "JwkDto")]
#[must_use]
pub struct Jwk {
    kid: Option<KeyId>,
    usage: Option<jwa::Usage>,
    alg: Option<jwa::Algorithm>,
    key: jwa::rsa::PublicKey,
}

impl Jwk {
    /// The key id, if the key has one
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }

    /// The usage the key is pinned to
    #[must_use]
    pub fn usage(&self) -> Option<jwa::Usage> {
        self.usage
    }

    /// The algorithm the key is pinned to
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.alg
    }

    /// The RSA public key
    pub fn public_key(&self) -> &jwa::rsa::PublicKey {
        &self.key
    }

    /// Whether neither pin conflicts with `alg`
    #[must_use]
    pub fn accepts(&self, alg: jwa::Algorithm) -> bool {
        self.alg.map_or(true, |pinned| pinned == alg)
            && self.usage.map_or(true, |usage| usage == alg.to_usage())
    }

    /// Publishes the key under `kid`
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            kid: Some(kid.into()),
            ..self
        }
    }

    /// Pins the key to `usage`
    pub fn with_usage(self, usage: jwa::Usage) -> Self {
        Self {
            usage: Some(usage),
            ..self
        }
    }

    /// Pins the key to `alg`, and to the usage that goes with it
    pub fn with_algorithm(self, alg: jwa::Algorithm) -> Self {
        Self {
            alg: Some(alg),
            usage: Some(alg.to_usage()),
            ..self
        }
    }
}

impl From<jwa::rsa::PublicKey> for Jwk {
    fn from(key: jwa::rsa::PublicKey) -> Self {
        Self {
            kid: None,
            usage: None,
            alg: None,
            key,
        }
    }
}

impl jws::Verifier for Jwk {
    type Error = error::JwkVerifyError;

    fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        if self.usage.map_or(false, |usage| usage != alg.to_usage()) {
            return Err(error::JwkVerifyError::UsageMismatch);
        }
        if self.alg.map_or(false, |pinned| pinned != alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        jws::Verifier::verify(&self.key, alg, data, signature)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
enum KeyType {
    #[serde(rename = "RSA")]
    Rsa,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct JwkDto {
    kty: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyId>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    usage: Option<jwa::Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<jwa::Algorithm>,
    #[serde(flatten)]
    key: jwa::rsa::PublicKey,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::IncompatibleAlgorithm;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        let JwkDto {
            kty: KeyType::Rsa,
            kid,
            usage,
            alg,
            key,
        } = dto;

        if let Some(alg) = alg {
            if usage.map_or(false, |usage| usage != alg.to_usage()) {
                return Err(error::incompatible_algorithm(alg));
            }
        }

        Ok(Self {
            kid,
            usage,
            alg,
            key,
        })
    }
}

impl From<Jwk> for JwkDto {
    fn from(jwk: Jwk) -> Self {
        Self {
            kty: KeyType::Rsa,
            kid: jwk.kid,
            usage: jwk.usage,
            alg: jwk.alg,
            key: jwk.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::jws::Verifier;

    const PUBLISHED: &str = r#"{
        "alg": "RS256",
        "kty": "RSA",
        "use": "sig",
        "n": "wSdOQ42jl9kVqG_Hv5S8wZNJN1q9iQtV6ItSVPX2mGUsiHRI7qxebKSlgKCsOJWfoM4tmDkyQf4xdOTzFAKJzRg_i9CHE8f5JUt8MCf73rWLlyJ1GCu3Ove3RIjoupRcOswejPmYIobq7vxpS90OBelHp0YNiZJwt3ZX5g_zhgOE_U_cSbwRPgyTjYTaC7j5uMpRGHecwaxQgsSQQOcpH_keSBr5igq9TGbqNoqkwl4Qp9J3rKm4FqA4Z3j3tDpTCtzZQ1Z5EMfZ2cBbkYTPwu_UKyZjdfFP57lOdwUFFHZh8e57q6RsssJX1Z6sRtjPv3z0KvIY0SgH7qUt3VWU1A",
        "e": "AQAB",
        "kid": "2kzHuRgmm0YM-ul03Dy4m",
        "x5t": "nX2VMrq7ASVNfOwjOJhP-EF5WyM",
        "x5c": ["MIIDDTCCAfWgAwIBAgIJ"]
    }"#;

    #[test]
    fn reads_a_published_key() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(PUBLISHED)?;
        assert_eq!(jwk.key_id().map(KeyIdRef::as_str), Some("2kzHuRgmm0YM-ul03Dy4m"));
        assert_eq!(jwk.algorithm(), Some(jwa::Algorithm::RS256));
        assert_eq!(jwk.usage(), Some(jwa::Usage::Signing));
        assert!(jwk.accepts(jwa::Algorithm::RS256));
        assert!(!jwk.accepts(jwa::Algorithm::PS256));
        Ok(())
    }

    #[test]
    fn key_type_is_required() {
        let result = serde_json::from_str::<Jwk>(r#"{ "kid": "a", "n": "AQAB", "e": "AQAB" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn encryption_key_refuses_to_verify() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(PUBLISHED)?;
        let jwk = jwk.with_usage(jwa::Usage::Encryption);

        let result = jwk.verify(jwa::Algorithm::RS256, b"data", &[0; 256]);
        assert!(matches!(result, Err(error::JwkVerifyError::UsageMismatch)));
        Ok(())
    }

    #[test]
    fn pinned_key_refuses_other_algorithms() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(PUBLISHED)?;

        let result = jwk.verify(jwa::Algorithm::RS512, b"data", &[0; 256]);
        assert!(matches!(
            result,
            Err(error::JwkVerifyError::IncompatibleAlgorithm(err))
                if err.algorithm() == jwa::Algorithm::RS512
        ));
        Ok(())
    }

    #[test]
    fn writes_only_public_members() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(PUBLISHED)?;
        let value = serde_json::to_value(&jwk)?;
        assert_eq!(value["kty"], "RSA");
        assert_eq!(value["e"], "AQAB");
        assert_eq!(value["kid"], "2kzHuRgmm0YM-ul03Dy4m");
        assert!(value.get("x5c").is_none());
        Ok(())
    }
}
