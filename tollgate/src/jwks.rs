use serde::{Deserialize, Deserializer, Serialize};

use crate::{jwa, jwk, Jwk};

/// A JSON Web Key Set
///
/// Deserialization keeps going past keys it cannot use, such as elliptic
/// curve keys. Each skipped key is logged at `warn`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "usable_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// The keys, in publication order
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether some key is published under `kid`
    #[must_use]
    pub fn contains_key_id(&self, kid: &jwk::KeyIdRef) -> bool {
        self.keys.iter().any(|k| k.key_id() == Some(kid))
    }

    /// The key to verify a token whose header names `kid` and `alg`
    ///
    /// Only keys published under `kid` whose pins allow `alg` are
    /// considered. A key pinned to `alg` wins over one pinned only to the
    /// signing usage, which wins over an unpinned key; ties go to the key
    /// published first.
    #[must_use]
    pub fn get_key_by_id(&self, kid: &jwk::KeyIdRef, alg: jwa::Algorithm) -> Option<&Jwk> {
        let mut best: Option<(&Jwk, u8)> = None;

        for key in self
            .keys
            .iter()
            .filter(|k| k.key_id() == Some(kid) && k.accepts(alg))
        {
            let rank = 2 * u8::from(key.algorithm().is_some()) + u8::from(key.usage().is_some());
            if best.map_or(true, |(_, top)| rank > top) {
                best = Some((key, rank));
            }
        }

        best.map(|(key, _)| key)
    }
}

impl Extend<Jwk> for Jwks {
    fn extend<I: IntoIterator<Item = Jwk>>(&mut self, keys: I) {
        self.keys.extend(keys);
    }
}

impl FromIterator<Jwk> for Jwks {
    fn from_iter<I: IntoIterator<Item = Jwk>>(keys: I) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

fn usable_keys<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Jwk>, D::Error> {
    let published = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let mut keys = Vec::with_capacity(published.len());

    for (idx, value) in published.into_iter().enumerate() {
        let describe = |member: &str| value.get(member).and_then(|v| v.as_str()).map(str::to_owned);
        let (kid, kty, alg) = (describe("kid"), describe("kty"), describe("alg"));

        match serde_json::from_value::<Jwk>(value) {
            Ok(jwk) => keys.push(jwk),
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(
                    error,
                    jwks.idx = idx,
                    jwk.kid = ?kid,
                    jwk.kty = ?kty,
                    jwk.alg = ?alg,
                    "skipping unusable JWK"
                );
            }
        }
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;

    fn rsa_key(kid: &str, pins: &str) -> String {
        format!(
            r#"{{ "kid": "{}", "kty": "RSA", {} "n": "{}", "e": "AQAB" }}"#,
            kid,
            pins,
            "w".repeat(342),
        )
    }

    fn key_set(keys: &[String]) -> Result<Jwks> {
        Ok(serde_json::from_str(&format!(r#"{{ "keys": [{}] }}"#, keys.join(",")))?)
    }

    #[test]
    #[traced_test]
    fn unusable_keys_are_skipped() -> Result<()> {
        let jwks = key_set(&[
            r#"{ "kid": "ec", "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA" }"#.to_owned(),
            r#"{ "kid": "enc", "use": "enc", "alg": "RSA-OAEP" }"#.to_owned(),
            "{}".to_owned(),
            rsa_key("good", r#""use": "sig", "alg": "RS256","#),
        ])?;

        assert_eq!(jwks.keys().len(), 1);
        assert!(jwks.contains_key_id(jwk::KeyIdRef::from_str("good")));
        assert!(logs_contain("skipping unusable JWK"));
        Ok(())
    }

    #[test]
    fn looks_keys_up_by_id() -> Result<()> {
        let jwks = key_set(&[rsa_key("one", ""), rsa_key("two", "")])?;

        let two = jwk::KeyIdRef::from_str("two");
        let found = jwks.get_key_by_id(two, jwa::Algorithm::RS256);
        assert_eq!(found.and_then(Jwk::key_id), Some(two));

        let three = jwk::KeyIdRef::from_str("three");
        assert!(jwks.get_key_by_id(three, jwa::Algorithm::RS256).is_none());
        assert!(!jwks.contains_key_id(three));
        Ok(())
    }

    #[test]
    fn pinned_key_only_serves_its_algorithm() -> Result<()> {
        let jwks = key_set(&[rsa_key("one", r#""alg": "RS256","#)])?;

        let one = jwk::KeyIdRef::from_str("one");
        assert!(jwks.get_key_by_id(one, jwa::Algorithm::RS256).is_some());
        assert!(jwks.get_key_by_id(one, jwa::Algorithm::PS256).is_none());
        Ok(())
    }

    #[test]
    fn most_specific_key_wins() -> Result<()> {
        let jwks = key_set(&[
            rsa_key("k", ""),
            rsa_key("k", r#""use": "sig","#),
            rsa_key("k", r#""alg": "RS256","#),
        ])?;

        let found = jwks.get_key_by_id(jwk::KeyIdRef::from_str("k"), jwa::Algorithm::RS256);
        assert_eq!(found.and_then(Jwk::algorithm), Some(jwa::Algorithm::RS256));
        Ok(())
    }

    #[test]
    fn keys_member_must_be_an_array() {
        assert!(serde_json::from_str::<Jwks>(r#"{ "keys": {} }"#).is_err());
        assert!(serde_json::from_str::<Jwks>(r#"{}"#).is_err());
    }
}
