//! Asymmetric-key functionality: signature verification over a closed set of named algorithms.

use std::convert::TryFrom;

use ed25519_dalek::{self as ed25519, Verifier};

use super::{Error, Result};

/// Name of the Ed25519 signature algorithm.
pub const ED25519: &str = "ed25519";

/// Verifies `signature` over `data` with `public_key`, using the algorithm named `algorithm`.
///
/// Fails if the algorithm is outside the supported set, if the key or signature bytes are
/// malformed, or if the signature does not verify.
pub fn verify(data: &[u8], signature: &[u8], public_key: &[u8], algorithm: &str) -> Result<()> {
    match algorithm {
        ED25519 => {
            let public_key = ed25519::PublicKey::from_bytes(public_key)
                .map_err(|error| Error::AsymmetricKey(error.to_string()))?;
            let signature = ed25519::Signature::try_from(signature)
                .map_err(|error| Error::AsymmetricKey(error.to_string()))?;
            public_key
                .verify(data, &signature)
                .map_err(|_| Error::SignatureInvalid)
        }
        other => Err(Error::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::testing::{TestRng, TestValidator};

    #[test]
    fn verify_valid_signature() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let data = rng.gen::<[u8; 32]>();

        let signature = validator.sign(&data);
        assert!(verify(&data, &signature, validator.public_key(), ED25519).is_ok());
    }

    #[test]
    fn reject_tampered_signature() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let data = rng.gen::<[u8; 32]>();

        let mut signature = validator.sign(&data);
        signature[0] ^= 0xff;
        assert!(matches!(
            verify(&data, &signature, validator.public_key(), ED25519),
            Err(Error::SignatureInvalid)
        ));
    }

    #[test]
    fn reject_unsupported_algorithm() {
        let mut rng = TestRng::new();
        let validator = TestValidator::random(&mut rng);
        let data = rng.gen::<[u8; 32]>();

        let signature = validator.sign(&data);
        assert!(matches!(
            verify(&data, &signature, validator.public_key(), "secp256k1"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
