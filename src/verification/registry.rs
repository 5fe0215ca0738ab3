//! Certificate Registry Snapshot
//!
//! The record matcher never talks to storage directly. It reads through
//! [`RegistryReader`], which the storage layer implements; [`InMemoryRegistry`]
//! is the read-only snapshot used by the CLI and tests, loaded from YAML or
//! JSON files.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::types::RegistryRecord;
use crate::error::RegistryError;

/// Read access to the authoritative certificate registry
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// Records in insertion order, restricted to `institution_id` when given
    async fn records(
        &self,
        institution_id: Option<&str>,
    ) -> Result<Vec<RegistryRecord>, RegistryError>;
}

/// On-disk layout of a registry snapshot file
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    records: Vec<RegistryRecord>,
}

/// Immutable, ordered registry snapshot
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    records: Vec<RegistryRecord>,
}

impl InMemoryRegistry {
    /// Build a snapshot, rejecting duplicate `(institution_id, certificate_id)` pairs
    pub fn new(records: Vec<RegistryRecord>) -> Result<Self, RegistryError> {
        {
            let mut seen = HashSet::new();
            for r in &records {
                if !seen.insert((r.institution_id.as_str(), r.certificate_id.as_str())) {
                    return Err(RegistryError::DuplicateRecord {
                        institution_id: r.institution_id.clone(),
                        certificate_id: r.certificate_id.clone(),
                    });
                }
            }
        }
        Ok(Self { records })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Demo registry with the two reference certificates
    pub fn seeded() -> Self {
        Self {
            records: vec![
                RegistryRecord {
                    institution_id: "UoJ-01".to_string(),
                    certificate_id: "CERT-2023-0001".to_string(),
                    candidate_name: "Alice".to_string(),
                    roll_number: "RJH12345".to_string(),
                    course: "B.Sc Computer Science".to_string(),
                    year: 2023,
                },
                RegistryRecord {
                    institution_id: "UoJ-02".to_string(),
                    certificate_id: "CERT-2022-0099".to_string(),
                    candidate_name: "Bob".to_string(),
                    roll_number: "RJH98765".to_string(),
                    course: "MBA".to_string(),
                    year: 2022,
                },
            ],
        }
    }

    /// Load a snapshot from a `.yaml`/`.yml` or `.json` file with a top-level `records` list
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = std::fs::read_to_string(path)?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let file: RegistryFile = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| RegistryError::Parse {
                    path: path_str.clone(),
                    message: e.to_string(),
                })?
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| RegistryError::Parse {
                path: path_str.clone(),
                message: e.to_string(),
            })?,
            _ => return Err(RegistryError::UnsupportedFormat { path: path_str }),
        };

        let registry = Self::new(file.records)?;
        info!(
            "Loaded {} registry records from {}",
            registry.len(),
            path_str
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Synchronous form of [`RegistryReader::records`]
    pub fn snapshot(&self, institution_id: Option<&str>) -> Vec<RegistryRecord> {
        self.records
            .iter()
            .filter(|r| institution_id.map_or(true, |id| r.institution_id == id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RegistryReader for InMemoryRegistry {
    async fn records(
        &self,
        institution_id: Option<&str>,
    ) -> Result<Vec<RegistryRecord>, RegistryError> {
        let pool = self.snapshot(institution_id);
        debug!(
            institution_id = institution_id.unwrap_or("*"),
            pool = pool.len(),
            "registry pool selected"
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(institution: &str, cert: &str) -> RegistryRecord {
        RegistryRecord {
            institution_id: institution.to_string(),
            certificate_id: cert.to_string(),
            candidate_name: "Carol".to_string(),
            roll_number: "RJH00001".to_string(),
            course: "MA".to_string(),
            year: 2021,
        }
    }

    #[test]
    fn test_duplicate_records_rejected() {
        let err = InMemoryRegistry::new(vec![record("I-1", "C-1"), record("I-1", "C-1")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRecord { .. }));

        // Same certificate id under another institution is fine
        let ok = InMemoryRegistry::new(vec![record("I-1", "C-1"), record("I-2", "C-1")]);
        assert_eq!(ok.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_institution_filter_preserves_order() {
        let registry = InMemoryRegistry::new(vec![
            record("I-1", "C-1"),
            record("I-2", "C-2"),
            record("I-1", "C-3"),
        ])
        .unwrap();

        let pool = registry.records(Some("I-1")).await.unwrap();
        let ids: Vec<_> = pool.iter().map(|r| r.certificate_id.as_str()).collect();
        assert_eq!(ids, vec!["C-1", "C-3"]);

        assert_eq!(registry.records(None).await.unwrap().len(), 3);
        assert!(registry.records(Some("nope")).await.unwrap().is_empty());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"records:
  - institution_id: UoJ-01
    certificate_id: CERT-2023-0001
    candidate_name: Alice
    roll_number: RJH12345
    course: B.Sc Computer Science
    year: 2023
"#
        )
        .unwrap();

        let registry = InMemoryRegistry::load_file(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(None)[0].candidate_name, "Alice");
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"records": [{{"institution_id": "UoJ-02", "certificate_id": "CERT-2022-0099",
                "candidate_name": "Bob", "roll_number": "RJH98765", "course": "MBA", "year": 2022}}]}}"#
        )
        .unwrap();

        let registry = InMemoryRegistry::load_file(file.path()).unwrap();
        assert_eq!(registry.snapshot(Some("UoJ-02")).len(), 1);
    }

    #[test]
    fn test_load_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        let err = InMemoryRegistry::load_file(file.path()).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_load_malformed_yaml_names_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "records: [unterminated").unwrap();

        match InMemoryRegistry::load_file(file.path()).unwrap_err() {
            RegistryError::Parse { path, .. } => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_seeded_registry() {
        let registry = InMemoryRegistry::seeded();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.snapshot(Some("UoJ-01"))[0].roll_number, "RJH12345");
    }
}
