//! Field candidate extraction
//!
//! OCR and QR decoding are external collaborators. This module holds the
//! post-processing that turns their raw output into [`FieldCandidates`]:
//!
//! - labelled lines (`Roll No: RJH12345`) in recognised text
//! - regex fallback for certificate ids and roll numbers
//! - filename heuristic (`alice_RJH12345_CERT-2023-0001.png`) when the
//!   text yields nothing
//! - QR payloads, either a JSON object or an opaque string

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::verification::types::{
    FieldCandidates, CANDIDATE_NAME, CERTIFICATE_ID, COURSE, ROLL_NUMBER,
};

/// Key used for QR payloads that are not JSON objects
pub const RAW_QR_KEY: &str = "raw";

const MAX_VALUE_CHARS: usize = 128;

/// Labels tried in order for each field
const FIELD_LABELS: [(&str, &[&str]); 4] = [
    (CANDIDATE_NAME, &["name", "candidate", "student name"]),
    (ROLL_NUMBER, &["roll", "roll no", "roll number"]),
    (CERTIFICATE_ID, &["certificate id", "certificate no", "cert id"]),
    (COURSE, &["course", "program", "degree"]),
];

static CERTIFICATE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(CERT[-\s]?\d{4}[-\s]?\d{3,5})").unwrap());

static ROLL_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(RJH\d{4,8}|ROLL\s?No\.?\s?[A-Za-z0-9-]+)").unwrap());

/// Boundary to an OCR/QR engine. Implementations never fail; an unreadable
/// document yields an empty candidate set.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, document: &[u8], file_name: Option<&str>) -> FieldCandidates;
}

/// Extractor for documents whose recognised text is already available, such
/// as OCR sidecar files. The payload is read as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFieldExtractor;

impl FieldExtractor for TextFieldExtractor {
    fn extract(&self, document: &[u8], file_name: Option<&str>) -> FieldCandidates {
        let text = String::from_utf8_lossy(document);
        FieldCandidates::from_document_text(&text, file_name)
    }
}

impl FieldCandidates {
    /// Labelled lines first, then the regex fallback for fields still missing
    pub fn from_labeled_text(text: &str) -> FieldCandidates {
        let mut fields = FieldCandidates::new();

        for (key, labels) in FIELD_LABELS {
            if let Some(value) = labels.iter().find_map(|label| find_after(text, label)) {
                fields.insert(key, value);
            }
        }

        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        for (key, re) in [
            (CERTIFICATE_ID, &*CERTIFICATE_ID_RE),
            (ROLL_NUMBER, &*ROLL_NUMBER_RE),
        ] {
            if fields.contains(key) {
                continue;
            }
            if let Some(m) = re.captures(&flat).and_then(|c| c.get(1)) {
                fields.insert(key, m.as_str());
            }
        }

        fields
    }

    /// Parse a name like `alice_RJH12345_CERT-2023-0001_bsc_physics.png`
    /// into name, roll number, certificate id and course, in that order
    pub fn from_file_name(file_name: &str) -> FieldCandidates {
        let base_name = file_name.rsplit('/').next().unwrap_or(file_name);
        let stem = base_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(base_name);
        let parts: Vec<&str> = stem
            .split(['-', '_', ' '])
            .filter(|p| !p.is_empty())
            .collect();

        let mut fields = FieldCandidates::new();
        if let Some(name) = parts.first() {
            fields.insert(CANDIDATE_NAME, title_case(name));
        }
        if let Some(roll) = parts.get(1) {
            fields.insert(ROLL_NUMBER, *roll);
        }
        if let Some(cert) = parts.get(2) {
            fields.insert(CERTIFICATE_ID, *cert);
        }
        if parts.len() > 3 {
            fields.insert(COURSE, title_case(&parts[3..].join(" ")));
        }
        fields
    }

    /// Recognised text with the filename heuristic as a last resort
    pub fn from_document_text(text: &str, file_name: Option<&str>) -> FieldCandidates {
        let fields = Self::from_labeled_text(text);
        if !fields.is_empty() {
            return fields;
        }
        match file_name {
            Some(name) => {
                debug!(file_name = name, "no fields in text, using filename heuristic");
                Self::from_file_name(name)
            }
            None => fields,
        }
    }

    /// Read a JSON object of string values, such as fields keyed in by a
    /// reviewer
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<FieldCandidates> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Decoded QR text: a JSON object becomes a field map, anything else is
    /// kept verbatim under `raw`
    pub fn from_qr_payload(payload: &str) -> FieldCandidates {
        if payload.is_empty() {
            return FieldCandidates::new();
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => None,
                    Value::String(s) => Some((k, s)),
                    other => Some((k, other.to_string())),
                })
                .collect(),
            _ => FieldCandidates::new().with(RAW_QR_KEY, payload),
        }
    }
}

/// Text after the first colon of the first line that mentions `label` and
/// has a colon. A blank value there ends the search for this label.
fn find_after(text: &str, label: &str) -> Option<String> {
    let label = label.to_lowercase();
    let (_, value) = text
        .lines()
        .filter(|line| line.to_lowercase().contains(&label))
        .find_map(|line| line.split_once(':'))?;
    let value: String = value.trim().chars().take(MAX_VALUE_CHARS).collect();
    (!value.is_empty()).then_some(value)
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}
