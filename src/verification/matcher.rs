//! Record Matcher / Scorer
//!
//! Picks the registry record that best explains the extracted fields and
//! reports which fields agree with it.
//!
//! ## Selection
//!
//! | Field | Points | Comparison |
//! |-------|--------|------------|
//! | `certificate_id` | 3 | exact |
//! | `roll_number` | 2 | exact |
//! | `candidate_name` | 1 | case-insensitive |
//!
//! The highest total wins, even at zero. Ties go to the record that comes
//! first in registry order, so repeated calls against an unchanged snapshot
//! always choose the same record.
//!
//! ## Field comparison
//!
//! Once a record is chosen, `certificate_id`, `roll_number`, `candidate_name`
//! and `course` are compared case-insensitively. Identifiers only earn
//! selection points on an exact match, so `cert-2023-0001` scores nothing
//! against `CERT-2023-0001`; if that record is chosen anyway (by other
//! fields or registry order) the same value counts as a match.
//!
//! ## Confidence
//!
//! `0.45 + 0.15 * matched - 0.10 * mismatched`, clamped to `[0.0, 0.99]`,
//! computed in whole hundredths so the two-decimal rounding is exact.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::registry::RegistryReader;
use super::types::{
    FieldCandidates, FieldMismatch, MatchResult, RegistryRecord, CANDIDATE_NAME, CERTIFICATE_ID,
    COMPARED_FIELDS, ROLL_NUMBER,
};

/// Score reported when there is no registry record to compare against
pub const NO_MATCH_SCORE: f64 = 0.20;

pub const MSG_VALID: &str = "Certificate appears valid";
pub const MSG_MISMATCH: &str = "Potential forgery or data mismatch";
pub const MSG_NO_MATCH: &str = "No matching record found";
pub const WARN_NO_REGISTRY: &str = "Connect to authoritative registry to improve accuracy.";

const CERTIFICATE_ID_POINTS: u32 = 3;
const ROLL_NUMBER_POINTS: u32 = 2;
const CANDIDATE_NAME_POINTS: u32 = 1;

// Confidence arithmetic in hundredths
const BASE_CENTS: i64 = 45;
const MATCH_CENTS: i64 = 15;
const MISMATCH_CENTS: i64 = 10;
const MAX_CENTS: i64 = 99;

/// Compute the bounded confidence for a given number of agreeing and
/// disagreeing fields
pub fn confidence(matched: usize, mismatched: usize) -> f64 {
    let cents = BASE_CENTS + MATCH_CENTS * matched as i64 - MISMATCH_CENTS * mismatched as i64;
    cents.clamp(0, MAX_CENTS) as f64 / 100.0
}

/// Stateless matcher; the registry is always passed in
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordMatcher;

impl RecordMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Integer selection score of one record
    pub fn score_record(&self, fields: &FieldCandidates, record: &RegistryRecord) -> u32 {
        let mut score = 0;
        if fields.present(CERTIFICATE_ID) == Some(record.certificate_id.as_str()) {
            score += CERTIFICATE_ID_POINTS;
        }
        if fields.present(ROLL_NUMBER) == Some(record.roll_number.as_str()) {
            score += ROLL_NUMBER_POINTS;
        }
        if let Some(name) = fields.present(CANDIDATE_NAME) {
            if name.to_lowercase() == record.candidate_name.to_lowercase() {
                score += CANDIDATE_NAME_POINTS;
            }
        }
        score
    }

    /// Highest-scoring record, first one in pool order on ties
    pub fn select_best<'a>(
        &self,
        fields: &FieldCandidates,
        pool: &'a [RegistryRecord],
    ) -> Option<(&'a RegistryRecord, u32)> {
        let mut best: Option<(&RegistryRecord, u32)> = None;
        for record in pool {
            let score = self.score_record(fields, record);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((record, score)),
            }
        }
        best
    }

    /// Match fields against an already-selected candidate pool
    pub fn match_fields(&self, fields: &FieldCandidates, pool: &[RegistryRecord]) -> MatchResult {
        let Some((record, match_score)) = self.select_best(fields, pool) else {
            debug!(fields = fields.len(), "empty registry pool");
            return Self::registry_miss(fields);
        };

        let mut matched_fields = BTreeMap::new();
        let mut mismatched_fields = BTreeMap::new();

        for key in COMPARED_FIELDS {
            let Some(provided) = fields.get(key) else {
                continue;
            };
            let expected = record.field(key).unwrap_or_default();
            if fields_agree(provided, expected) {
                matched_fields.insert(key.to_string(), provided.to_string());
            } else {
                mismatched_fields.insert(
                    key.to_string(),
                    FieldMismatch {
                        provided: provided.to_string(),
                        expected: Some(expected.to_string()),
                    },
                );
            }
        }

        let score = confidence(matched_fields.len(), mismatched_fields.len());
        let success =
            !matched_fields.is_empty() && !mismatched_fields.contains_key(CERTIFICATE_ID);

        debug!(
            institution_id = %record.institution_id,
            certificate_id = %record.certificate_id,
            match_score,
            matched = matched_fields.len(),
            mismatched = mismatched_fields.len(),
            score,
            success,
            "registry record selected"
        );

        MatchResult {
            record: Some(record.clone()),
            match_score,
            matched_fields,
            mismatched_fields,
            success,
            score,
            message: (if success { MSG_VALID } else { MSG_MISMATCH }).to_string(),
            warnings: Vec::new(),
        }
    }

    /// Read the candidate pool through `registry` and match against it.
    ///
    /// A registry fault degrades to the empty-pool result.
    pub async fn match_against(
        &self,
        registry: &dyn RegistryReader,
        fields: &FieldCandidates,
        institution_id: Option<&str>,
    ) -> MatchResult {
        match registry.records(institution_id).await {
            Ok(pool) => self.match_fields(fields, &pool),
            Err(e) => {
                warn!("Registry read failed, treating pool as empty: {}", e);
                Self::registry_miss(fields)
            }
        }
    }

    fn registry_miss(fields: &FieldCandidates) -> MatchResult {
        let mismatched_fields = fields
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    FieldMismatch {
                        provided: v.to_string(),
                        expected: None,
                    },
                )
            })
            .collect();

        MatchResult {
            record: None,
            match_score: 0,
            matched_fields: BTreeMap::new(),
            mismatched_fields,
            success: false,
            score: NO_MATCH_SCORE,
            message: MSG_NO_MATCH.to_string(),
            warnings: vec![WARN_NO_REGISTRY.to_string()],
        }
    }
}

/// Post-selection field comparison
fn fields_agree(provided: &str, expected: &str) -> bool {
    provided.to_lowercase() == expected.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::verification::registry::InMemoryRegistry;
    use crate::verification::types::{COURSE, SIGNATURE};
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn alice_fields() -> FieldCandidates {
        FieldCandidates::new()
            .with(CERTIFICATE_ID, "CERT-2023-0001")
            .with(ROLL_NUMBER, "RJH12345")
            .with(CANDIDATE_NAME, "Alice")
    }

    fn pool() -> Vec<RegistryRecord> {
        InMemoryRegistry::seeded().snapshot(None)
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence(0, 0), 0.45);
        assert_eq!(confidence(3, 0), 0.90);
        assert_eq!(confidence(4, 0), 0.99);
        assert_eq!(confidence(1, 1), 0.50);
        assert_eq!(confidence(0, 5), 0.0);
    }

    #[test]
    fn test_exact_record_matches() {
        let result = RecordMatcher::new().match_fields(&alice_fields(), &pool());

        assert!(result.success);
        assert_eq!(result.score, 0.90);
        assert_eq!(result.match_score, 6);
        assert_eq!(result.matched_fields.len(), 3);
        assert!(result.mismatched_fields.is_empty());
        assert_eq!(result.message, MSG_VALID);
        assert_eq!(
            result.record.as_ref().map(|r| r.certificate_id.as_str()),
            Some("CERT-2023-0001")
        );
    }

    #[test]
    fn test_unknown_certificate_fails() {
        let fields = FieldCandidates::new().with(CERTIFICATE_ID, "CERT-9999-0000");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        assert!(!result.success);
        assert_eq!(result.match_score, 0);
        assert_eq!(
            result.mismatched_fields.get(CERTIFICATE_ID),
            Some(&FieldMismatch {
                provided: "CERT-9999-0000".to_string(),
                expected: Some("CERT-2023-0001".to_string()),
            })
        );
        assert_eq!(result.score, 0.35);
        assert_eq!(result.message, MSG_MISMATCH);
    }

    #[test]
    fn test_certificate_mismatch_overrides_other_matches() {
        let fields = FieldCandidates::new()
            .with(CERTIFICATE_ID, "CERT-2023-0002")
            .with(ROLL_NUMBER, "RJH12345")
            .with(CANDIDATE_NAME, "Alice")
            .with(COURSE, "b.sc computer science");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        assert_eq!(result.matched_fields.len(), 3);
        assert!(result.mismatched_fields.contains_key(CERTIFICATE_ID));
        assert!(!result.success);
        assert_eq!(result.score, 0.80);
    }

    #[test]
    fn test_empty_pool_is_registry_miss() {
        let fields = alice_fields().with(SIGNATURE, "token");
        let result = RecordMatcher::new().match_fields(&fields, &[]);

        assert!(result.is_registry_miss());
        assert!(!result.success);
        assert_eq!(result.score, NO_MATCH_SCORE);
        assert_eq!(result.message, MSG_NO_MATCH);
        assert_eq!(result.warnings, vec![WARN_NO_REGISTRY.to_string()]);
        assert!(result.matched_fields.is_empty());
        assert_eq!(result.mismatched_fields.len(), 4);
        assert!(result.mismatched_fields.values().all(|m| m.expected.is_none()));
    }

    #[test]
    fn test_tie_prefers_registry_order() {
        let mut records = pool();
        let mut twin = records[0].clone();
        twin.institution_id = "UoJ-03".to_string();
        records.push(twin);

        let fields = FieldCandidates::new().with(CANDIDATE_NAME, "alice");
        let matcher = RecordMatcher::new();
        let first = matcher.match_fields(&fields, &records);
        let second = matcher.match_fields(&fields, &records);

        assert_eq!(first, second);
        assert_eq!(
            first.record.as_ref().map(|r| r.institution_id.as_str()),
            Some("UoJ-01")
        );
    }

    #[test]
    fn test_zero_score_still_selects_first_record() {
        let fields = FieldCandidates::new().with(COURSE, "MBA");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        // Nothing scores, so the first record is compared and the course disagrees
        assert_eq!(result.match_score, 0);
        assert_eq!(
            result.record.as_ref().map(|r| r.certificate_id.as_str()),
            Some("CERT-2023-0001")
        );
        assert!(result.mismatched_fields.contains_key(COURSE));
        assert!(!result.success);
    }

    #[test]
    fn test_case_rules_differ_between_selection_and_comparison() {
        let fields = FieldCandidates::new().with(CERTIFICATE_ID, "cert-2022-0099");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        // Exact selection scores nothing, so the first record wins the scan,
        // and then the case-insensitive comparison disagrees with it.
        assert_eq!(result.match_score, 0);
        assert!(result.mismatched_fields.contains_key(CERTIFICATE_ID));

        let fields = FieldCandidates::new().with(CERTIFICATE_ID, "cert-2023-0001");
        let result = RecordMatcher::new().match_fields(&fields, &pool());
        assert_eq!(result.match_score, 0);
        assert!(result.matched_fields.contains_key(CERTIFICATE_ID));
        assert!(result.success);
    }

    #[test]
    fn test_non_schema_fields_ignored() {
        let fields = alice_fields()
            .with(SIGNATURE, "abc")
            .with("raw", "payload");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        assert!(!result.matched_fields.contains_key(SIGNATURE));
        assert!(!result.mismatched_fields.contains_key(SIGNATURE));
        assert!(!result.mismatched_fields.contains_key("raw"));
    }

    #[test]
    fn test_empty_value_compared_but_not_scored() {
        let fields = FieldCandidates::new()
            .with(CERTIFICATE_ID, "")
            .with(ROLL_NUMBER, "RJH98765");
        let result = RecordMatcher::new().match_fields(&fields, &pool());

        assert_eq!(result.match_score, 2);
        assert_eq!(
            result.record.as_ref().map(|r| r.candidate_name.as_str()),
            Some("Bob")
        );
        assert!(result.mismatched_fields.contains_key(CERTIFICATE_ID));
        assert!(!result.success);
    }

    struct FailingRegistry;

    #[async_trait]
    impl RegistryReader for FailingRegistry {
        async fn records(
            &self,
            _institution_id: Option<&str>,
        ) -> Result<Vec<RegistryRecord>, RegistryError> {
            Err(RegistryError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_registry_fault_degrades_to_miss() {
        let result = RecordMatcher::new()
            .match_against(&FailingRegistry, &alice_fields(), None)
            .await;
        assert!(result.is_registry_miss());
        assert_eq!(result.score, NO_MATCH_SCORE);
    }

    #[tokio::test]
    async fn test_institution_filter_restricts_pool() {
        let registry = InMemoryRegistry::seeded();
        let matcher = RecordMatcher::new();

        let result = matcher
            .match_against(&registry, &alice_fields(), Some("UoJ-02"))
            .await;
        assert_eq!(
            result.record.as_ref().map(|r| r.candidate_name.as_str()),
            Some("Bob")
        );
        assert!(!result.success);

        let result = matcher
            .match_against(&registry, &alice_fields(), Some("UoJ-99"))
            .await;
        assert!(result.is_registry_miss());
    }

    fn arb_fields() -> impl Strategy<Value = FieldCandidates> {
        let value = prop_oneof![
            Just(String::new()),
            Just("CERT-2023-0001".to_string()),
            Just("RJH98765".to_string()),
            Just("alice".to_string()),
            Just("MBA".to_string()),
            "[A-Za-z0-9-]{1,12}",
        ];
        proptest::collection::btree_map(
            prop_oneof![
                Just(CERTIFICATE_ID.to_string()),
                Just(ROLL_NUMBER.to_string()),
                Just(CANDIDATE_NAME.to_string()),
                Just(COURSE.to_string()),
                Just(SIGNATURE.to_string()),
            ],
            value,
            0..5,
        )
        .prop_map(|m| m.into_iter().collect::<FieldCandidates>())
    }

    proptest! {
        #[test]
        fn prop_score_bounded_and_rounded(fields in arb_fields(), empty in any::<bool>()) {
            let records = if empty { Vec::new() } else { pool() };
            let result = RecordMatcher::new().match_fields(&fields, &records);

            prop_assert!((0.0..=0.99).contains(&result.score));
            let hundredths = result.score * 100.0;
            prop_assert!((hundredths - hundredths.round()).abs() < 1e-9);

            if result.record.is_some() {
                for key in result.matched_fields.keys() {
                    prop_assert!(!result.mismatched_fields.contains_key(key));
                }
                let mut union: Vec<&str> = result
                    .matched_fields
                    .keys()
                    .chain(result.mismatched_fields.keys())
                    .map(String::as_str)
                    .collect();
                union.sort_unstable();
                let mut expected: Vec<&str> = COMPARED_FIELDS
                    .iter()
                    .copied()
                    .filter(|k| fields.contains(k))
                    .collect();
                expected.sort_unstable();
                prop_assert_eq!(union, expected);
            }

            let again = RecordMatcher::new().match_fields(&fields, &records);
            prop_assert_eq!(result, again);
        }
    }
}
