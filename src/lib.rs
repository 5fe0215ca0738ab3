//! Certificate authenticity verification
//!
//! Matches extracted certificate fields against an authoritative registry,
//! screens the scanned image for tampering heuristics, checks embedded
//! signatures and verification URLs, and fuses everything into one
//! explainable verdict.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cert_verify::{FieldCandidates, InMemoryRegistry, VerificationRequest, VerificationService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let service = VerificationService::builder(Arc::new(InMemoryRegistry::seeded())).build()?;
//! let fields = FieldCandidates::new()
//!     .with("certificate_id", "CERT-2023-0001")
//!     .with("roll_number", "RJH12345");
//! let verdict = service.verify(VerificationRequest::new(fields, Vec::new())).await;
//! assert!(verdict.success);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Environment-driven configuration
pub mod config;

// OCR/QR post-processing into field candidates
pub mod extract;

// Matching, anomaly heuristics, trust checks and fusion
pub mod verification;

// Essential error types
pub use error::{
    ConfigError, ImageDecodeError, RegistryError, Result, SignatureError, VerifyError,
};

pub use config::VerifierConfig;
pub use extract::{FieldExtractor, TextFieldExtractor};
pub use verification::{
    FieldCandidates, ImageQualityAnalyzer, ImageQualityReport, InMemoryRegistry, MatchResult,
    RegistryReader, RegistryRecord, TrustSignal, TrustVerdict, VerdictSink, VerificationRequest,
    VerificationService, VerificationVerdict,
};

// System info
pub use system_info::get_system_info;

/// System information module
pub mod system_info {
    /// Get system information
    pub fn get_system_info() -> String {
        format!("cert-verify v{}", env!("CARGO_PKG_VERSION"))
    }
}
