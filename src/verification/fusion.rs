//! Confidence Fusion
//!
//! Collapses the match result, the corroborating trust signals and the image
//! warnings into one verdict. Only the registry match decides `success` and
//! `score`; the other signals are advisory and surface as warnings, in this
//! order:
//!
//! 1. match warnings (e.g. no registry pool)
//! 2. signature warning, when the signature is invalid
//! 3. URL warning, when the URL was rejected
//! 4. image anomaly warnings, in detection order

use tracing::info;

use super::types::{MatchResult, TrustSignals, VerificationDetails, VerificationVerdict};

pub const WARN_SIGNATURE: &str = "Signature invalid or unverifiable";
pub const URL_WARNING_PREFIX: &str = "QR URL validation failed";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceFusion;

impl ConfidenceFusion {
    pub fn new() -> Self {
        Self
    }

    pub fn fuse(
        &self,
        match_result: MatchResult,
        trust: &TrustSignals,
        anomaly_warnings: Vec<String>,
    ) -> VerificationVerdict {
        let MatchResult {
            matched_fields,
            mismatched_fields,
            success,
            score,
            message,
            mut warnings,
            ..
        } = match_result;

        if trust.signature.is_invalid() {
            warnings.push(WARN_SIGNATURE.to_string());
        }
        if trust.url.is_invalid() {
            let detail = trust.url.detail.as_deref().unwrap_or("unknown");
            warnings.push(format!("{}: {}", URL_WARNING_PREFIX, detail));
        }
        warnings.extend(anomaly_warnings);

        info!(
            success,
            score,
            signature = %trust.signature.verdict,
            url = %trust.url.verdict,
            warnings = warnings.len(),
            "verification verdict fused"
        );

        VerificationVerdict {
            success,
            score,
            message,
            details: VerificationDetails {
                matched_fields,
                mismatched_fields,
                warnings,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::anomaly::WARN_BLUR;
    use crate::verification::matcher::{RecordMatcher, WARN_NO_REGISTRY};
    use crate::verification::registry::InMemoryRegistry;
    use crate::verification::types::{FieldCandidates, TrustSignal, CERTIFICATE_ID};

    fn matched() -> MatchResult {
        let fields = FieldCandidates::new().with(CERTIFICATE_ID, "CERT-2023-0001");
        RecordMatcher::new().match_fields(&fields, &InMemoryRegistry::seeded().snapshot(None))
    }

    #[test]
    fn test_clean_signals_pass_match_through() {
        let result = matched();
        let verdict = ConfidenceFusion::new().fuse(result.clone(), &TrustSignals::default(), vec![]);

        assert_eq!(verdict.success, result.success);
        assert_eq!(verdict.score, result.score);
        assert_eq!(verdict.message, result.message);
        assert_eq!(verdict.details.matched_fields, result.matched_fields);
        assert!(verdict.details.warnings.is_empty());
    }

    #[test]
    fn test_warning_order() {
        let miss = RecordMatcher::new().match_fields(&FieldCandidates::new(), &[]);
        let trust = TrustSignals {
            signature: TrustSignal::invalid("InvalidSignature"),
            url: TrustSignal::invalid(r#"{"reason":"invalid_scheme"}"#),
        };
        let verdict = ConfidenceFusion::new().fuse(miss, &trust, vec![WARN_BLUR.to_string()]);

        assert_eq!(
            verdict.details.warnings,
            vec![
                WARN_NO_REGISTRY.to_string(),
                WARN_SIGNATURE.to_string(),
                r#"QR URL validation failed: {"reason":"invalid_scheme"}"#.to_string(),
                WARN_BLUR.to_string(),
            ]
        );
        assert!(!verdict.success);
        assert_eq!(verdict.score, 0.20);
    }

    #[test]
    fn test_advisory_signals_do_not_move_score() {
        let result = matched();
        let trust = TrustSignals {
            signature: TrustSignal::invalid("ExpiredSignature"),
            url: TrustSignal::invalid("x"),
        };
        let verdict = ConfidenceFusion::new().fuse(
            result.clone(),
            &trust,
            vec![WARN_BLUR.to_string()],
        );
        assert_eq!(verdict.success, result.success);
        assert_eq!(verdict.score, result.score);
        assert_eq!(verdict.details.warnings.len(), 3);
    }

    #[test]
    fn test_valid_and_unchecked_signals_add_nothing() {
        let trust = TrustSignals {
            signature: TrustSignal::valid(Some("HS256".to_string())),
            url: TrustSignal::not_checked(),
        };
        let verdict = ConfidenceFusion::new().fuse(matched(), &trust, vec![]);
        assert!(verdict.details.warnings.is_empty());
    }
}
