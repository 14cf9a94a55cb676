use std::{fmt, sync::Arc};

use openssl::{pkey::Private, rsa::Rsa};
use ring::{rand::SystemRandom, signature::RsaKeyPair};

use super::PublicKey;
use crate::{error, jwa, jws};

/// An RSA key pair for minting tokens
///
/// Intended for tests and tooling; a resource server only ever needs the
/// published [`PublicKey`].
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    pair: Arc<RsaKeyPair>,
    public_key: PublicKey,
}

impl PrivateKey {
    /// A fresh 2048-bit key pair
    ///
    /// # Errors
    ///
    /// The key could not be generated.
    pub fn generate() -> Result<Self, error::Unexpected> {
        let rsa = Rsa::generate(2048).map_err(error::unexpected)?;
        Self::from_openssl(&rsa).map_err(error::unexpected)
    }

    /// Reads a PEM-encoded RSA private key
    ///
    /// # Errors
    ///
    /// The PEM does not hold a usable RSA private key.
    pub fn from_pem(pem: &str) -> Result<Self, error::KeyRejected> {
        let rsa = Rsa::private_key_from_pem(pem.as_bytes()).map_err(error::key_rejected)?;
        Self::from_openssl(&rsa)
    }

    fn from_openssl(rsa: &Rsa<Private>) -> Result<Self, error::KeyRejected> {
        let public_key = PublicKey::from_components(rsa.n().to_vec(), rsa.e().to_vec())?;
        let der = rsa.private_key_to_der().map_err(error::key_rejected)?;
        let pair = RsaKeyPair::from_der(&der).map_err(|err| error::key_rejected(err.to_string()))?;

        Ok(Self {
            pair: Arc::new(pair),
            public_key,
        })
    }

    /// The public half, to be published
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl jws::Signer for PrivateKey {
    type Error = error::Unexpected;

    fn sign(&self, alg: jwa::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut signature = vec![0; self.pair.public().modulus_len()];
        self.pair
            .sign(alg.signing_params(), &SystemRandom::new(), data, &mut signature)
            .map_err(|err| error::unexpected(err.to_string()))?;
        Ok(signature)
    }
}
