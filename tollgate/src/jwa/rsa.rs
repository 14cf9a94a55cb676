//! RSA key material

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::{b64::Base64Url, error, jwa, jws};

#[cfg(feature = "private-keys")]
mod private;

#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
pub use private::PrivateKey;

/// Accepted modulus sizes, in bytes
const MODULUS_BYTES: std::ops::RangeInclusive<usize> = (2048 / 8)..=(8192 / 8);

/// An RSA public key: the `n` and `e` members of a JWK
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Components")]
#[must_use]
pub struct PublicKey {
    n: Base64Url,
    e: Base64Url,
}

#[derive(Deserialize)]
struct Components {
    n: Base64Url,
    e: Base64Url,
}

impl TryFrom<Components> for PublicKey {
    type Error = error::KeyRejected;

    fn try_from(Components { n, e }: Components) -> Result<Self, Self::Error> {
        Self::from_components(n, e)
    }
}

impl PublicKey {
    /// Builds a key from its modulus and public exponent, big-endian
    ///
    /// Leading zero octets are ignored.
    ///
    /// # Errors
    ///
    /// The modulus is outside 2048 to 8192 bits, or the exponent is zero.
    pub fn from_components(
        modulus: impl Into<Base64Url>,
        exponent: impl Into<Base64Url>,
    ) -> Result<Self, error::KeyRejected> {
        let n = Base64Url::from(unsigned(modulus.into().as_slice()));
        let e = Base64Url::from(unsigned(exponent.into().as_slice()));

        let bits = n.as_slice().len() * 8;
        if !MODULUS_BYTES.contains(&n.as_slice().len()) {
            return Err(error::key_rejected(format!(
                "RSA modulus of {bits} bits is outside 2048 to 8192 bits"
            )));
        }
        if e.as_slice().is_empty() {
            return Err(error::key_rejected("RSA exponent is zero"));
        }

        Ok(Self { n, e })
    }

    /// The modulus, big-endian
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        self.n.as_slice()
    }

    /// The public exponent, big-endian
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        self.e.as_slice()
    }
}

fn unsigned(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl jws::Verifier for PublicKey {
    type Error = error::SignatureMismatch;

    fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        ring::signature::RsaPublicKeyComponents {
            n: self.modulus(),
            e: self.exponent(),
        }
        .verify(alg.verification_params(), data, signature)
        .map_err(|_| error::signature_mismatch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jws::Verifier;

    #[test]
    fn modulus_must_be_at_least_2048_bits() {
        assert!(PublicKey::from_components(vec![0xff; 255], vec![1, 0, 1]).is_err());
        assert!(PublicKey::from_components(vec![0xff; 256], vec![1, 0, 1]).is_ok());
    }

    #[test]
    fn exponent_must_not_be_zero() {
        assert!(PublicKey::from_components(vec![0xff; 256], vec![0, 0]).is_err());
    }

    #[test]
    fn leading_zeros_are_ignored() -> Result<(), error::KeyRejected> {
        let mut modulus = vec![0];
        modulus.extend_from_slice(&[0xc3; 256]);

        let key = PublicKey::from_components(modulus, vec![0, 1, 0, 1])?;
        assert_eq!(key.modulus().len(), 256);
        assert_eq!(key.exponent(), &[1, 0, 1]);
        Ok(())
    }

    #[test]
    fn garbage_signature_does_not_verify() -> Result<(), error::KeyRejected> {
        let key = PublicKey::from_components(vec![0xc3; 256], vec![1, 0, 1])?;
        assert!(key
            .verify(jwa::Algorithm::RS256, b"message", &[0; 256])
            .is_err());
        Ok(())
    }
}
