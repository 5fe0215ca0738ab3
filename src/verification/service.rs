//! Verification Service
//!
//! Runs one verification request end to end. The registry read, pixel
//! analysis, signature check and URL probe do not depend on each other and
//! run concurrently; the verdict is fused once all four have finished.
//!
//! ```ignore
//! let service = VerificationService::builder(Arc::new(InMemoryRegistry::seeded())).build()?;
//! let verdict = service
//!     .verify(VerificationRequest::new(fields, image_bytes).with_file_name("scan.png"))
//!     .await;
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use super::anomaly::{ImageQualityAnalyzer, ImageQualityReport};
use super::fusion::ConfidenceFusion;
use super::matcher::RecordMatcher;
use super::registry::{InMemoryRegistry, RegistryReader};
use super::signature::{SignatureVerifier, VerificationKey};
use super::sink::{TracingSink, VerdictSink, VerificationLog};
use super::types::{FieldCandidates, TrustSignals, VerificationVerdict};
use super::url_trust::{UrlTrustChecker, DEFAULT_ALLOWED_DOMAINS, DEFAULT_PROBE_TIMEOUT};
use crate::config::VerifierConfig;
use crate::error::{ImageDecodeError, Result};

const DEV_SIGNATURE_SECRET: &str = "dev-secret-change-me";

/// Everything the caller knows about one submitted document
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    pub fields: FieldCandidates,
    pub image_bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub institution_id: Option<String>,
    pub source_ip: Option<String>,
}

impl VerificationRequest {
    pub fn new(fields: FieldCandidates, image_bytes: Vec<u8>) -> Self {
        Self {
            fields,
            image_bytes,
            ..Default::default()
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_institution(mut self, institution_id: impl Into<String>) -> Self {
        self.institution_id = Some(institution_id.into());
        self
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct VerificationService {
    registry: Arc<dyn RegistryReader>,
    matcher: RecordMatcher,
    analyzer: Arc<ImageQualityAnalyzer>,
    signature: SignatureVerifier,
    url_checker: UrlTrustChecker,
    fusion: ConfidenceFusion,
    sink: Arc<dyn VerdictSink>,
}

impl VerificationService {
    pub fn builder(registry: Arc<dyn RegistryReader>) -> VerificationServiceBuilder {
        VerificationServiceBuilder::new(registry)
    }

    /// Wire every component from configuration. The registry comes from
    /// `registry_path` when set, otherwise the seeded demo snapshot.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        config.validate()?;
        let registry = match &config.registry_path {
            Some(path) => InMemoryRegistry::load_file(path)?,
            None => InMemoryRegistry::seeded(),
        };

        Self::builder(Arc::new(registry))
            .analyzer(ImageQualityAnalyzer::with_thresholds(config.anomaly))
            .signature_verifier(SignatureVerifier::new(config.verification_key()?))
            .url_checker(UrlTrustChecker::new(
                &config.allowed_domains,
                config.probe_timeout(),
            )?)
            .build()
    }

    /// Verify one document. Never fails: every sub-check degrades to a
    /// neutral or negative signal and the verdict is always well formed.
    pub async fn verify(&self, request: VerificationRequest) -> VerificationVerdict {
        let VerificationRequest {
            fields,
            image_bytes,
            file_name,
            institution_id,
            source_ip,
        } = request;

        let analyzer = Arc::clone(&self.analyzer);
        let hint = file_name.clone();
        let image_task =
            tokio::task::spawn_blocking(move || analyzer.analyze(&image_bytes, hint.as_deref()));

        let (match_result, anomaly_warnings, signature, url) = tokio::join!(
            self.matcher
                .match_against(self.registry.as_ref(), &fields, institution_id.as_deref()),
            async {
                image_task.await.unwrap_or_else(|e| {
                    warn!("Image analysis task failed: {}", e);
                    Vec::new()
                })
            },
            async { self.signature.verify(&fields) },
            self.url_checker.verify(&fields),
        );

        let trust = TrustSignals {
            signature: signature.signal,
            url,
        };
        let verdict = self.fusion.fuse(match_result, &trust, anomaly_warnings);

        self.sink.record(VerificationLog::from_verdict(
            &verdict,
            &fields,
            file_name.as_deref(),
            institution_id.as_deref(),
            source_ip.as_deref(),
        ));

        verdict
    }

    /// Image metrics and warnings without the rest of the pipeline
    pub fn inspect_image(
        &self,
        image_bytes: &[u8],
        file_name: Option<&str>,
    ) -> std::result::Result<ImageQualityReport, ImageDecodeError> {
        self.analyzer.inspect(image_bytes, file_name)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct VerificationServiceBuilder {
    registry: Arc<dyn RegistryReader>,
    analyzer: Option<ImageQualityAnalyzer>,
    signature: Option<SignatureVerifier>,
    url_checker: Option<UrlTrustChecker>,
    sink: Option<Arc<dyn VerdictSink>>,
}

impl VerificationServiceBuilder {
    pub fn new(registry: Arc<dyn RegistryReader>) -> Self {
        Self {
            registry,
            analyzer: None,
            signature: None,
            url_checker: None,
            sink: None,
        }
    }

    pub fn analyzer(mut self, analyzer: ImageQualityAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn signature_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.signature = Some(verifier);
        self
    }

    pub fn url_checker(mut self, checker: UrlTrustChecker) -> Self {
        self.url_checker = Some(checker);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn VerdictSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Unset components fall back to defaults: default thresholds, the
    /// development HMAC secret, the default allowlist probed over HTTP and
    /// a tracing sink
    pub fn build(self) -> Result<VerificationService> {
        let url_checker = match self.url_checker {
            Some(checker) => checker,
            None => UrlTrustChecker::new(DEFAULT_ALLOWED_DOMAINS, DEFAULT_PROBE_TIMEOUT)?,
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        info!(sink = sink.sink_name(), "verification service ready");

        let signature = self.signature.unwrap_or_else(|| {
            SignatureVerifier::new(VerificationKey::secret(DEV_SIGNATURE_SECRET))
        });

        Ok(VerificationService {
            registry: self.registry,
            matcher: RecordMatcher::new(),
            analyzer: Arc::new(self.analyzer.unwrap_or_default()),
            signature,
            url_checker,
            fusion: ConfidenceFusion::new(),
            sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::verification::matcher::{MSG_NO_MATCH, WARN_NO_REGISTRY};
    use crate::verification::sink::ChannelSink;
    use crate::verification::types::{RegistryRecord, CERTIFICATE_ID, ROLL_NUMBER};
    use crate::verification::url_trust::UrlProbe;
    use async_trait::async_trait;
    use url::Url;

    struct OkProbe;

    #[async_trait]
    impl UrlProbe for OkProbe {
        async fn probe(&self, _url: &Url) -> std::result::Result<u16, String> {
            Ok(200)
        }
    }

    struct FailingRegistry;

    #[async_trait]
    impl RegistryReader for FailingRegistry {
        async fn records(
            &self,
            _institution_id: Option<&str>,
        ) -> std::result::Result<Vec<RegistryRecord>, RegistryError> {
            Err(RegistryError::Unavailable("connection refused".to_string()))
        }
    }

    fn offline_checker() -> UrlTrustChecker {
        UrlTrustChecker::with_probe(
            DEFAULT_ALLOWED_DOMAINS,
            DEFAULT_PROBE_TIMEOUT,
            Arc::new(OkProbe),
        )
    }

    #[tokio::test]
    async fn test_verify_emits_one_log_event() {
        let (sink, mut rx) = ChannelSink::new();
        let service = VerificationService::builder(Arc::new(InMemoryRegistry::seeded()))
            .url_checker(offline_checker())
            .sink(Arc::new(sink))
            .build()
            .unwrap();

        let fields = FieldCandidates::new()
            .with(CERTIFICATE_ID, "CERT-2023-0001")
            .with(ROLL_NUMBER, "RJH12345");
        let request = VerificationRequest::new(fields, Vec::new())
            .with_file_name("alice.png")
            .with_institution("UoJ-01")
            .with_source_ip("127.0.0.1");
        let verdict = service.verify(request).await;

        assert!(verdict.success);
        assert_eq!(verdict.score, 0.75);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.success, verdict.success);
        assert_eq!(event.score, verdict.score);
        assert_eq!(event.message, verdict.message);
        assert_eq!(event.certificate_id.as_deref(), Some("CERT-2023-0001"));
        assert_eq!(event.institution_id.as_deref(), Some("UoJ-01"));
        assert_eq!(event.source_ip.as_deref(), Some("127.0.0.1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registry_fault_still_yields_verdict() {
        let service = VerificationService::builder(Arc::new(FailingRegistry))
            .url_checker(offline_checker())
            .build()
            .unwrap();

        let fields = FieldCandidates::new().with(CERTIFICATE_ID, "CERT-2023-0001");
        let verdict = service
            .verify(VerificationRequest::new(fields, b"not an image".to_vec()))
            .await;

        assert!(!verdict.success);
        assert_eq!(verdict.score, 0.20);
        assert_eq!(verdict.message, MSG_NO_MATCH);
        assert_eq!(verdict.details.warnings, vec![WARN_NO_REGISTRY.to_string()]);
    }

    #[tokio::test]
    async fn test_inspect_image_rejects_pdf() {
        let service = VerificationService::builder(Arc::new(InMemoryRegistry::empty()))
            .url_checker(offline_checker())
            .build()
            .unwrap();
        assert!(matches!(
            service.inspect_image(b"%PDF-1.4", None),
            Err(ImageDecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_empty_allowlist() {
        let config = VerifierConfig {
            allowed_domains: vec![],
            ..Default::default()
        };
        assert!(VerificationService::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_missing_registry_file() {
        let config = VerifierConfig {
            registry_path: Some("/nonexistent/registry.yaml".into()),
            ..Default::default()
        };
        assert!(VerificationService::from_config(&config).is_err());
    }
}
