//! use issuekit::error::IssuanceError;

use std::time::Duration;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, IssuanceError>;

/// Represents errors that can occur while generating keys, signing certificates,
/// or exporting issued profiles.
///
/// Failures coming from a cryptographic primitive carry the primitive's own
/// diagnostic, captured at the call site that failed.
#[derive(Debug, Error, Clone)]
pub enum IssuanceError {
    /// The key or service configuration was rejected at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error during key generation.
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Existing key material could not be imported.
    #[error("Key import failed: {0}")]
    KeyImportFailed(ImportFailure),

    /// An argument was rejected before any primitive ran.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error while serializing key material or a profile.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// The requested output format is not known.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Profile metadata failed validation.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The subject identity or validity window is unusable.
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// The request conflicts with the authority's issuance policy.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Error while signing.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// A signature did not verify against the given key.
    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),

    /// The issuance did not finish before its deadline.
    #[error("Issuance timed out after {0:?}")]
    Timeout(Duration),

    /// The thread running an issuance could not be started or died.
    #[error("Issuance worker failed: {0}")]
    Worker(String),

    /// The persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),
}

/// Why key material could not be imported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportFailure {
    /// The material is not a recognizable key encoding.
    #[error("malformed key material: {0}")]
    Malformed(String),

    /// The key uses an algorithm or curve this crate does not handle.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The material is encrypted and no passphrase was given.
    #[error("key is encrypted and no passphrase was supplied")]
    PassphraseRequired,

    /// The material is encrypted and the passphrase did not decrypt it.
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
}

impl From<ImportFailure> for IssuanceError {
    fn from(failure: ImportFailure) -> Self {
        IssuanceError::KeyImportFailed(failure)
    }
}

impl From<der::Error> for IssuanceError {
    /// Converts a `der::Error` into an `IssuanceError`.
    fn from(err: der::Error) -> Self {
        IssuanceError::DecodingError(err.to_string())
    }
}

impl From<pem::PemError> for IssuanceError {
    fn from(err: pem::PemError) -> Self {
        IssuanceError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for IssuanceError {
    fn from(err: pkcs8::spki::Error) -> Self {
        IssuanceError::DecodingError(err.to_string())
    }
}
