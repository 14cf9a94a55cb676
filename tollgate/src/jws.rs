//! Producing and checking JWS signatures ([RFC7515][])
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515

use std::error::Error as StdError;

use crate::jwa;

/// Checks a signature over a signing input
pub trait Verifier {
    /// Why a signature was refused
    type Error: StdError + Send + Sync + 'static;

    /// Checks `signature` over `data`, using `alg`
    ///
    /// # Errors
    ///
    /// The signature does not match, or this verifier cannot use `alg`.
    fn verify(&self, alg: jwa::Algorithm, data: &[u8], signature: &[u8])
        -> Result<(), Self::Error>;
}

impl<T: Verifier + ?Sized> Verifier for &T {
    type Error = T::Error;

    fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        (**self).verify(alg, data, signature)
    }
}

/// Signs a signing input
#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
pub trait Signer {
    /// Why a signature could not be produced
    type Error: StdError + Send + Sync + 'static;

    /// Signs `data` with `alg`
    ///
    /// # Errors
    ///
    /// The underlying key failed to sign.
    fn sign(&self, alg: jwa::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error>;
}
