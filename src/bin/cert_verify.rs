//! Certificate verification CLI
//!
//! Runs the verification pipeline against a local scan.
//!
//! # Usage
//!
//! ```bash
//! # Verify a scan using an OCR text sidecar and a decoded QR payload
//! cert-verify verify --image scan.png --ocr-text scan.txt \
//!     --qr '{"certificate_id":"CERT-2023-0001","sig":"eyJ..."}'
//!
//! # Verify against a registry snapshot with explicit fields
//! cert-verify verify --image scan.png --fields fields.json --registry registry.yaml
//!
//! # Image metrics only
//! cert-verify inspect --image scan.png
//! ```
//!
//! Configuration comes from the environment (see `VerifierConfig`); logs go
//! to stderr and honour `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cert_verify::{
    get_system_info, FieldCandidates, FieldExtractor, ImageQualityAnalyzer, TextFieldExtractor,
    VerificationRequest, VerificationService, VerifierConfig,
};

#[derive(Parser)]
#[command(name = "cert-verify")]
#[command(version)]
#[command(about = "Verify certificate scans against a registry, with image and trust checks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full verification pipeline and print the verdict as JSON
    Verify {
        /// Scanned certificate image
        #[arg(long)]
        image: PathBuf,

        /// JSON object of extracted fields; overrides OCR fields
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Decoded QR payload (JSON object or raw text); overrides all other fields
        #[arg(long)]
        qr: Option<String>,

        /// Recognised text of the scan
        #[arg(long)]
        ocr_text: Option<PathBuf>,

        /// Restrict matching to one institution
        #[arg(long)]
        institution: Option<String>,

        /// Registry snapshot (YAML or JSON)
        #[arg(long, env = "REGISTRY_PATH")]
        registry: Option<PathBuf>,
    },

    /// Print image quality metrics and warnings as JSON
    Inspect {
        /// Scanned certificate image
        #[arg(long)]
        image: PathBuf,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cert_verify=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("{}", get_system_info());

    let result = match cli.command {
        Commands::Verify {
            image,
            fields,
            qr,
            ocr_text,
            institution,
            registry,
        } => cmd_verify(image, fields, qr, ocr_text, institution, registry).await,
        Commands::Inspect { image } => cmd_inspect(&image),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_verify(
    image: PathBuf,
    fields: Option<PathBuf>,
    qr: Option<String>,
    ocr_text: Option<PathBuf>,
    institution: Option<String>,
    registry: Option<PathBuf>,
) -> Result<()> {
    let mut config = VerifierConfig::from_env()?;
    if registry.is_some() {
        config.registry_path = registry;
    }
    let service = VerificationService::from_config(&config)?;

    let image_bytes =
        std::fs::read(&image).with_context(|| format!("Failed to read {}", image.display()))?;
    let file_name = file_name_of(&image);

    let mut candidates = match &ocr_text {
        Some(path) => {
            let text = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            TextFieldExtractor.extract(&text, file_name.as_deref())
        }
        None => file_name
            .as_deref()
            .map(FieldCandidates::from_file_name)
            .unwrap_or_default(),
    };
    if let Some(path) = &fields {
        let explicit = FieldCandidates::from_json_file(path)
            .with_context(|| format!("Failed to load fields from {}", path.display()))?;
        candidates = FieldCandidates::merged(&candidates, &explicit);
    }
    if let Some(payload) = &qr {
        let decoded = FieldCandidates::from_qr_payload(payload);
        candidates = FieldCandidates::merged(&candidates, &decoded);
    }
    info!(fields = candidates.len(), "field candidates assembled");

    let mut request = VerificationRequest::new(candidates, image_bytes);
    if let Some(name) = file_name {
        request = request.with_file_name(name);
    }
    if let Some(id) = institution {
        request = request.with_institution(id);
    }

    let verdict = service.verify(request).await;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn cmd_inspect(image: &Path) -> Result<()> {
    let config = VerifierConfig::from_env()?;
    let analyzer = ImageQualityAnalyzer::with_thresholds(config.anomaly);

    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let report = analyzer
        .inspect(&bytes, file_name_of(image).as_deref())
        .with_context(|| format!("Cannot analyse {}", image.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
