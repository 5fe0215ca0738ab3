//! Certificate Verification Module
//!
//! Decides whether a submitted certificate is authentic by fusing several
//! independent, individually weak signals into one bounded confidence
//! score plus the evidence behind it.
//!
//! ## Pipeline
//!
//! Field candidates (from OCR/QR) go to the record matcher while the raw
//! image bytes go to the image analyzer. An embedded `sig` token and a
//! verification URL, when present, feed the signature verifier and the URL
//! trust checker. All four run concurrently and converge in
//! [`ConfidenceFusion`].
//!
//! ## Key Components
//!
//! - [`RecordMatcher`] - best registry record, matched/mismatched fields, score
//! - [`ImageQualityAnalyzer`] - blur, compression, layout and ELA heuristics
//! - [`SignatureVerifier`] - embedded signed token check
//! - [`UrlTrustChecker`] - scheme, allowlist and reachability of embedded URLs
//! - [`ConfidenceFusion`] - the final verdict and its warning list
//! - [`VerificationService`] - runs the whole pipeline for one request
//!
//! ## Scores
//!
//! | Situation | Score | Success |
//! |-----------|-------|---------|
//! | No registry record to compare | 0.20 | false |
//! | `certificate_id` disagrees with the best record | formula | false |
//! | At least one field agrees, id not contradicted | formula | true |
//!
//! where formula = `0.45 + 0.15 * matched - 0.10 * mismatched` clamped to
//! `[0.0, 0.99]`. Signature, URL and image findings are advisory: they add
//! warnings but never move the score.

pub mod anomaly;
pub mod fusion;
pub mod matcher;
pub mod registry;
pub mod service;
pub mod signature;
pub mod sink;
pub mod types;
pub mod url_trust;

// Re-exports for convenience
pub use anomaly::{AnomalyThresholds, ImageMetrics, ImageQualityAnalyzer, ImageQualityReport};
pub use fusion::ConfidenceFusion;
pub use matcher::RecordMatcher;
pub use registry::{InMemoryRegistry, RegistryReader};
pub use service::{VerificationRequest, VerificationService, VerificationServiceBuilder};
pub use signature::{SignatureCheck, SignatureVerifier, VerificationKey};
pub use sink::{ChannelSink, NullSink, TracingSink, VerdictSink, VerificationLog};
pub use types::{
    FieldCandidates, FieldMismatch, MatchResult, RegistryRecord, TrustSignal, TrustSignals,
    TrustVerdict, VerificationDetails, VerificationVerdict,
};
pub use url_trust::{HttpProbe, UrlCheck, UrlProbe, UrlRejection, UrlTrustChecker};
