//! Error types for Mensago data handling
//!
//! `MensagoError` covers validation, encoding, and cryptographic failures
//! shared by every crate in the workspace.

/// Errors raised while handling Mensago data
#[derive(thiserror::Error, Debug)]
pub enum MensagoError {
    #[error("bad value: {0}")]
    BadValue(String),

    #[error("bad data: {0}")]
    BadData(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("empty data")]
    EmptyData,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported keycard type: {0}")]
    UnsupportedKeycardType(String),

    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),

    #[error("signature missing: {0}")]
    SignatureMissing(String),

    #[error("not compliant: {0}")]
    NotCompliant(String),

    #[error("invalid keycard: {0}")]
    InvalidKeycard(String),

    #[error("hash mismatch")]
    HashMismatch,

    #[error("verification failed")]
    VerificationFailed,

    #[error("decryption failure")]
    DecryptionFailed,

    #[error("encryption failure")]
    EncryptionFailed,

    #[error("password too weak: {strength}")]
    WeakPassword { strength: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MensagoError>;
