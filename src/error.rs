//! Error types for the verification core
//!
//! Every sub-check is fault-isolated: these errors describe why a signal
//! could not be produced, and the orchestrating service maps each of them
//! to a neutral or degraded signal instead of failing the request.

use thiserror::Error;

/// Top-level error for operations that can genuinely fail (loading
/// configuration, loading a registry snapshot, building the HTTP client).
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration errors, raised at startup only
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("URL allowlist is empty")]
    EmptyAllowlist,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read verification key from {path}: {reason}")]
    KeyUnreadable { path: String, reason: String },
}

/// Registry snapshot errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Duplicate registry record: institution '{institution_id}', certificate '{certificate_id}'")]
    DuplicateRecord {
        institution_id: String,
        certificate_id: String,
    },

    #[error("Unsupported registry file format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Failed to parse registry file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons an image payload produced no pixel signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageDecodeError {
    #[error("Unsupported document format: {0}")]
    Unsupported(String),

    #[error("Image could not be decoded: {0}")]
    Undecodable(String),

    #[error("Image has no pixels")]
    Empty,
}

/// Signature verification faults. Never raised past the verifier; they are
/// rendered into the detail string of an invalid trust signal.
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Malformed token header: {0}")]
    MalformedHeader(String),

    #[error("Algorithm {algorithm} is not accepted")]
    AlgorithmNotAccepted { algorithm: String },

    #[error("Algorithm {algorithm} requires {expected} key, configured key is {configured}")]
    KeyMismatch {
        algorithm: String,
        expected: &'static str,
        configured: &'static str,
    },

    #[error("Invalid verification key: {0}")]
    InvalidKey(String),

    #[error("Token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Convenience alias for the crate's fallible operations
pub type Result<T> = std::result::Result<T, VerifyError>;
