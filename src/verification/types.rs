//! Verification data model
//!
//! Field candidates come in from the extraction collaborators, registry
//! records are the ground truth, and every check produces one of the
//! signal types below before fusion collapses them into a single verdict.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Field names
// ============================================================================

pub const CERTIFICATE_ID: &str = "certificate_id";
pub const ROLL_NUMBER: &str = "roll_number";
pub const CANDIDATE_NAME: &str = "candidate_name";
pub const COURSE: &str = "course";
pub const SIGNATURE: &str = "sig";
pub const URL: &str = "url";
pub const VERIFY_URL: &str = "verify_url";

/// Fields compared against the chosen registry record, in comparison order
pub const COMPARED_FIELDS: [&str; 4] = [CERTIFICATE_ID, ROLL_NUMBER, CANDIDATE_NAME, COURSE];

// ============================================================================
// Field candidates
// ============================================================================

/// Extracted label -> value guesses for one document.
///
/// Any key may be absent. Once handed to the core the set is only read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCandidates(BTreeMap<String, String>);

impl FieldCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used by the extraction helpers
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value, including empty strings
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value only when it is non-empty
    pub fn present(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Embedded signed token, if any
    pub fn signature_token(&self) -> Option<&str> {
        self.present(SIGNATURE)
    }

    /// External verification URL (`url`, falling back to `verify_url`)
    pub fn verification_url(&self) -> Option<&str> {
        self.present(URL).or_else(|| self.present(VERIFY_URL))
    }

    /// Merge OCR and QR guesses; QR values win on conflicting keys.
    pub fn merged(ocr: &FieldCandidates, qr: &FieldCandidates) -> FieldCandidates {
        let mut out = ocr.clone();
        for (k, v) in qr.iter() {
            out.insert(k, v);
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldCandidates {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Registry record
// ============================================================================

/// One authoritative certificate entry.
///
/// `(institution_id, certificate_id)` is unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub institution_id: String,
    pub certificate_id: String,
    pub candidate_name: String,
    pub roll_number: String,
    pub course: String,
    pub year: i32,
}

impl RegistryRecord {
    /// Value of a compared field, `None` for names outside the record schema
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            CERTIFICATE_ID => Some(&self.certificate_id),
            ROLL_NUMBER => Some(&self.roll_number),
            CANDIDATE_NAME => Some(&self.candidate_name),
            COURSE => Some(&self.course),
            _ => None,
        }
    }
}

// ============================================================================
// Match result
// ============================================================================

/// Provided/expected pair for a field that did not agree with the registry.
///
/// `expected` is `None` when there was no record to compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub provided: String,
    pub expected: Option<String>,
}

/// Outcome of comparing field candidates against the best registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Best-scoring record; `None` when the candidate pool was empty
    pub record: Option<RegistryRecord>,

    /// Integer match score of the chosen record
    pub match_score: u32,

    pub matched_fields: BTreeMap<String, String>,

    pub mismatched_fields: BTreeMap<String, FieldMismatch>,

    pub success: bool,

    /// Confidence in [0.0, 0.99], two decimals
    pub score: f64,

    pub message: String,

    /// Warnings implied by the match itself (e.g. no registry pool)
    pub warnings: Vec<String>,
}

impl MatchResult {
    /// True when no registry record could be compared at all
    pub fn is_registry_miss(&self) -> bool {
        self.record.is_none()
    }
}

// ============================================================================
// Trust signals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustVerdict {
    NotChecked,
    Valid,
    Invalid,
}

impl std::fmt::Display for TrustVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustVerdict::NotChecked => write!(f, "not_checked"),
            TrustVerdict::Valid => write!(f, "valid"),
            TrustVerdict::Invalid => write!(f, "invalid"),
        }
    }
}

/// Verdict of a corroborating check (signature or URL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSignal {
    pub verdict: TrustVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TrustSignal {
    pub fn not_checked() -> Self {
        Self {
            verdict: TrustVerdict::NotChecked,
            detail: None,
        }
    }

    pub fn valid(detail: Option<String>) -> Self {
        Self {
            verdict: TrustVerdict::Valid,
            detail,
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self {
            verdict: TrustVerdict::Invalid,
            detail: Some(detail.into()),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.verdict == TrustVerdict::Invalid
    }
}

/// Both corroborating signals for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSignals {
    pub signature: TrustSignal,
    pub url: TrustSignal,
}

impl Default for TrustSignals {
    fn default() -> Self {
        Self {
            signature: TrustSignal::not_checked(),
            url: TrustSignal::not_checked(),
        }
    }
}

// ============================================================================
// Final verdict
// ============================================================================

/// Evidence attached to a verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub matched_fields: BTreeMap<String, String>,
    pub mismatched_fields: BTreeMap<String, FieldMismatch>,
    pub warnings: Vec<String>,
}

/// Fused decision returned to the caller. Serializes to the response shape
/// `{success, score, message, details: {matched_fields, mismatched_fields, warnings}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub success: bool,
    pub score: f64,
    pub message: String,
    pub details: VerificationDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_skips_empty_values() {
        let fields = FieldCandidates::new()
            .with(CERTIFICATE_ID, "")
            .with(ROLL_NUMBER, "RJH12345");

        assert_eq!(fields.get(CERTIFICATE_ID), Some(""));
        assert_eq!(fields.present(CERTIFICATE_ID), None);
        assert_eq!(fields.present(ROLL_NUMBER), Some("RJH12345"));
    }

    #[test]
    fn test_verification_url_fallback() {
        let fields = FieldCandidates::new().with(VERIFY_URL, "https://example.edu/v/1");
        assert_eq!(fields.verification_url(), Some("https://example.edu/v/1"));

        let fields = fields.with(URL, "https://university.example/c");
        assert_eq!(fields.verification_url(), Some("https://university.example/c"));
    }

    #[test]
    fn test_merged_prefers_qr() {
        let ocr = FieldCandidates::new()
            .with(CANDIDATE_NAME, "Alce")
            .with(COURSE, "MBA");
        let qr = FieldCandidates::new().with(CANDIDATE_NAME, "Alice");

        let merged = FieldCandidates::merged(&ocr, &qr);
        assert_eq!(merged.get(CANDIDATE_NAME), Some("Alice"));
        assert_eq!(merged.get(COURSE), Some("MBA"));
    }

    #[test]
    fn test_verdict_wire_shape() {
        let verdict = VerificationVerdict {
            success: false,
            score: 0.2,
            message: "No matching record found".to_string(),
            details: VerificationDetails {
                matched_fields: BTreeMap::new(),
                mismatched_fields: [(
                    CERTIFICATE_ID.to_string(),
                    FieldMismatch {
                        provided: "CERT-1".to_string(),
                        expected: None,
                    },
                )]
                .into_iter()
                .collect(),
                warnings: vec!["w".to_string()],
            },
        };

        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["score"], 0.2);
        assert_eq!(
            json["details"]["mismatched_fields"]["certificate_id"]["provided"],
            "CERT-1"
        );
        assert!(json["details"]["mismatched_fields"]["certificate_id"]["expected"].is_null());
        assert_eq!(json["details"]["warnings"][0], "w");
    }

    #[test]
    fn test_trust_signal_serialization() {
        let signal = TrustSignal::invalid("expired");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["verdict"], "invalid");
        assert_eq!(json["detail"], "expired");

        let json = serde_json::to_value(TrustSignal::not_checked()).unwrap();
        assert_eq!(json["verdict"], "not_checked");
        assert!(json.get("detail").is_none());
    }
}
