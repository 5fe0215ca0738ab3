//! Verification Log Sink
//!
//! Fire-and-forget side channel for verification attempts. The service
//! emits exactly one `VerificationLog` per request after the verdict is
//! fused; sinks never block and never fail, so persistence problems cannot
//! change a verdict.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{FieldCandidates, VerificationVerdict, CERTIFICATE_ID, ROLL_NUMBER};

const DEFAULT_BUFFER_SIZE: usize = 1024;

/// One verification attempt, as handed to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLog {
    pub verification_id: Uuid,
    /// Unix epoch milliseconds
    pub timestamp_ms: i64,
    pub source_ip: Option<String>,
    pub file_name: Option<String>,
    pub success: bool,
    pub score: f64,
    pub certificate_id: Option<String>,
    pub roll_number: Option<String>,
    pub institution_id: Option<String>,
    pub message: String,
}

impl VerificationLog {
    pub fn from_verdict(
        verdict: &VerificationVerdict,
        fields: &FieldCandidates,
        file_name: Option<&str>,
        institution_id: Option<&str>,
        source_ip: Option<&str>,
    ) -> Self {
        Self {
            verification_id: Uuid::new_v4(),
            timestamp_ms: Utc::now().timestamp_millis(),
            source_ip: source_ip.map(str::to_string),
            file_name: file_name.map(str::to_string),
            success: verdict.success,
            score: verdict.score,
            certificate_id: fields.present(CERTIFICATE_ID).map(str::to_string),
            roll_number: fields.present(ROLL_NUMBER).map(str::to_string),
            institution_id: institution_id.map(str::to_string),
            message: verdict.message.clone(),
        }
    }
}

/// Destination for verification attempts
pub trait VerdictSink: Send + Sync {
    /// Record one event. Must not block and must not fail.
    fn record(&self, event: VerificationLog);

    /// Name of this sink for logging
    fn sink_name(&self) -> &'static str;
}

/// Writes each attempt as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl VerdictSink for TracingSink {
    fn record(&self, event: VerificationLog) {
        info!(
            verification_id = %event.verification_id,
            success = event.success,
            score = event.score,
            certificate_id = event.certificate_id.as_deref().unwrap_or(""),
            file_name = event.file_name.as_deref().unwrap_or(""),
            "verification recorded"
        );
    }

    fn sink_name(&self) -> &'static str {
        "tracing"
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl VerdictSink for NullSink {
    fn record(&self, _event: VerificationLog) {}

    fn sink_name(&self) -> &'static str {
        "null"
    }
}

pub type VerificationLogReceiver = mpsc::Receiver<VerificationLog>;

/// Hands events to a drain task over a bounded channel.
///
/// `record` uses `try_send`: a full buffer or a closed receiver drops the
/// event and bumps the drop counter.
pub struct ChannelSink {
    sender: mpsc::Sender<VerificationLog>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new() -> (Self, VerificationLogReceiver) {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(size: usize) -> (Self, VerificationLogReceiver) {
        let (sender, receiver) = mpsc::channel(size);
        let sink = Self {
            sender,
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };
        (sink, receiver)
    }

    /// (emitted, dropped)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.emitted.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }
}

impl VerdictSink for ChannelSink {
    fn record(&self, event: VerificationLog) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Verification log dropped: {}", e);
        }
    }

    fn sink_name(&self) -> &'static str {
        "channel"
    }
}
