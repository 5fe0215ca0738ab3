//! URL Trust Checker
//!
//! Verification URLs embedded in a document are only trusted when they use
//! http(s), point at an allowlisted host, and answer a single bounded probe
//! with a non-error status. Every fault becomes a rejection reason.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::types::{FieldCandidates, TrustSignal};
use crate::error::Result;

pub const DEFAULT_ALLOWED_DOMAINS: [&str; 3] =
    ["verify.jh.gov.in", "example.edu", "university.example"];
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a URL was not trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UrlRejection {
    InvalidScheme,
    MalformedUrl { error: String },
    UntrustedDomain { host: String },
    HttpError { status: u16 },
    Exception { error: String },
}

/// Outcome of one URL check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlCheck {
    Accepted { status: u16 },
    Rejected(UrlRejection),
}

impl UrlCheck {
    pub fn accepted(&self) -> bool {
        matches!(self, UrlCheck::Accepted { .. })
    }

    /// Machine-readable detail, e.g. `{"reason":"untrusted_domain","host":"evil.example"}`
    pub fn detail(&self) -> String {
        match self {
            UrlCheck::Accepted { .. } => json!({"status": "ok"}).to_string(),
            UrlCheck::Rejected(reason) => {
                serde_json::to_string(reason).unwrap_or_else(|_| format!("{:?}", reason))
            }
        }
    }

    pub fn to_signal(&self) -> TrustSignal {
        if self.accepted() {
            TrustSignal::valid(Some(self.detail()))
        } else {
            TrustSignal::invalid(self.detail())
        }
    }
}

// ============================================================================
// Network probe
// ============================================================================

/// One network fetch; returns the HTTP status code
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &Url) -> std::result::Result<u16, String>;
}

/// `reqwest` probe. Redirects are not followed, so a 3xx answer counts as
/// a non-error status.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Probe with a caller-configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> std::result::Result<u16, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

// ============================================================================
// Checker
// ============================================================================

pub struct UrlTrustChecker {
    allowlist: HashSet<String>,
    timeout: Duration,
    probe: Arc<dyn UrlProbe>,
}

impl UrlTrustChecker {
    /// Checker probing over HTTP
    pub fn new<I, S>(allowlist: I, timeout: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let probe = HttpProbe::new(timeout)?;
        Ok(Self::with_probe(allowlist, timeout, Arc::new(probe)))
    }

    pub fn with_probe<I, S>(allowlist: I, timeout: Duration, probe: Arc<dyn UrlProbe>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowlist = allowlist
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            allowlist,
            timeout,
            probe,
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowlist.contains(&host.to_lowercase())
    }

    /// Check the document's verification URL, if it has one
    pub async fn verify(&self, fields: &FieldCandidates) -> TrustSignal {
        match fields.verification_url() {
            Some(url) => self.check(url).await.to_signal(),
            None => TrustSignal::not_checked(),
        }
    }

    /// Scheme, allowlist, then one probe bounded by the configured timeout
    pub async fn check(&self, raw: &str) -> UrlCheck {
        let url = match Url::parse(raw.trim()) {
            Ok(u) => u,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return UrlCheck::Rejected(UrlRejection::InvalidScheme)
            }
            Err(e) => {
                return UrlCheck::Rejected(UrlRejection::MalformedUrl {
                    error: e.to_string(),
                })
            }
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return UrlCheck::Rejected(UrlRejection::InvalidScheme);
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        if !self.is_allowed(&host) {
            debug!(%host, "URL host not on allowlist");
            return UrlCheck::Rejected(UrlRejection::UntrustedDomain { host });
        }

        let result = match tokio::time::timeout(self.timeout, self.probe.probe(&url)).await {
            Ok(Ok(status)) if status >= 400 => UrlCheck::Rejected(UrlRejection::HttpError { status }),
            Ok(Ok(status)) => UrlCheck::Accepted { status },
            Ok(Err(error)) => UrlCheck::Rejected(UrlRejection::Exception { error }),
            Err(_) => UrlCheck::Rejected(UrlRejection::Exception {
                error: format!("probe timed out after {}ms", self.timeout.as_millis()),
            }),
        };

        if result.accepted() {
            debug!(%url, "URL probe accepted");
        } else {
            warn!(%url, detail = %result.detail(), "URL probe rejected");
        }
        result
    }
}
