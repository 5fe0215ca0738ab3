//! Signature Verifier
//!
//! Documents may carry an embedded signed token (`sig`) whose claims vouch
//! for the certificate. The verifier checks signature and time claims
//! against the configured key and reports a trust signal; it never fails
//! the request.

use std::fmt;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{FieldCandidates, TrustSignal};
use crate::error::SignatureError;

/// Key material for token verification
#[derive(Clone)]
pub enum VerificationKey {
    /// Shared secret for the HMAC family (HS256/384/512)
    Secret(Vec<u8>),
    /// PEM-encoded RSA public key for RS*/PS* tokens
    RsaPublicPem(Vec<u8>),
}

impl VerificationKey {
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        Self::Secret(secret.as_ref().to_vec())
    }

    pub fn rsa_public_pem(pem: impl AsRef<[u8]>) -> Self {
        Self::RsaPublicPem(pem.as_ref().to_vec())
    }

    fn family(&self) -> &'static str {
        match self {
            VerificationKey::Secret(_) => "HMAC",
            VerificationKey::RsaPublicPem(_) => "RSA",
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey, SignatureError> {
        match self {
            VerificationKey::Secret(s) => Ok(DecodingKey::from_secret(s)),
            VerificationKey::RsaPublicPem(pem) => DecodingKey::from_rsa_pem(pem)
                .map_err(|e| SignatureError::InvalidKey(e.to_string())),
        }
    }
}

// Key bytes stay out of logs
impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey::{}(..)", self.family())
    }
}

fn required_family(alg: Algorithm) -> Option<&'static str> {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Some("HMAC"),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some("RSA"),
        _ => None,
    }
}

/// Outcome of a signature check
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureCheck {
    pub signal: TrustSignal,
    /// Decoded claims of a valid token
    pub claims: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerificationKey,
    accepted: Vec<Algorithm>,
}

impl SignatureVerifier {
    /// Verifier accepting the HMAC and RSA families
    pub fn new(key: VerificationKey) -> Self {
        Self {
            key,
            accepted: vec![
                Algorithm::HS256,
                Algorithm::HS384,
                Algorithm::HS512,
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
        }
    }

    /// Restrict the accepted algorithms
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.accepted = algorithms;
        self
    }

    /// Check the `sig` field of `fields`, if there is one
    pub fn verify(&self, fields: &FieldCandidates) -> SignatureCheck {
        let Some(token) = fields.signature_token() else {
            return SignatureCheck {
                signal: TrustSignal::not_checked(),
                claims: None,
            };
        };

        match self.verify_token(token) {
            Ok((alg, claims)) => {
                debug!(?alg, "embedded signature valid");
                SignatureCheck {
                    signal: TrustSignal::valid(Some(format!("{:?}", alg))),
                    claims: Some(claims),
                }
            }
            Err(e) => {
                warn!("Embedded signature rejected: {}", e);
                SignatureCheck {
                    signal: TrustSignal::invalid(e.to_string()),
                    claims: None,
                }
            }
        }
    }

    /// Verify one token; returns the algorithm used and the decoded claims.
    ///
    /// `exp` and `nbf` are optional but enforced without leeway when present.
    pub fn verify_token(&self, token: &str) -> Result<(Algorithm, Value), SignatureError> {
        let header =
            decode_header(token).map_err(|e| SignatureError::MalformedHeader(e.to_string()))?;
        let alg = header.alg;

        if !self.accepted.contains(&alg) {
            return Err(SignatureError::AlgorithmNotAccepted {
                algorithm: format!("{:?}", alg),
            });
        }
        let expected = required_family(alg).ok_or_else(|| SignatureError::AlgorithmNotAccepted {
            algorithm: format!("{:?}", alg),
        })?;
        if expected != self.key.family() {
            return Err(SignatureError::KeyMismatch {
                algorithm: format!("{:?}", alg),
                expected,
                configured: self.key.family(),
            });
        }

        let mut validation = Validation::new(alg);
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        validation.validate_nbf = true;

        let data = decode::<Value>(token, &self.key.decoding_key()?, &validation)?;
        Ok((alg, data.claims))
    }
}
