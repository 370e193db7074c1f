//! Cryptographic types and functions used by the DAG layer: the 32-byte content hash that
//! identifies blocks and deploys, and signature verification over a closed set of algorithms.

pub mod asymmetric_key;
pub mod hash;

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid public key or signature bytes.
    #[error("asymmetric key error: {0}")]
    AsymmetricKey(String),

    /// The named signature algorithm is outside the supported set.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Error while decoding from hex.
    #[error("hex decoding error: {0}")]
    FromHex(#[from] hex::FromHexError),

    /// The signature failed verification.
    #[error("signature verification failed")]
    SignatureInvalid,
}

/// A specialized `Result` type for cryptographic errors.
pub type Result<T> = std::result::Result<T, Error>;
