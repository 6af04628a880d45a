//! Opt-in, redacting diagnostics for the auth gate.
//!
//! Raw tokens and claim values never reach the log. With
//! [`DiagnosticMode::Redacted`] the gate logs a short SHA-256 fingerprint of the
//! token (enough to correlate two log lines about the same token) and the names
//! of the claims it decoded.

use sha2::{Digest, Sha256};

use crate::config::DiagnosticMode;
use crate::services::verifier::Identity;

const FINGERPRINT_HEX_LEN: usize = 12;

/// Short, non-reversible fingerprint of a secret value.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(FINGERPRINT_HEX_LEN)
        .collect()
}

pub fn before_verify(mode: DiagnosticMode, token: &str) {
    if mode == DiagnosticMode::Redacted {
        tracing::info!(token = %fingerprint(token), "verifying bearer token");
    }
}

pub fn after_verify(mode: DiagnosticMode, token: &str, identity: &Identity) {
    if mode == DiagnosticMode::Redacted {
        let claims: Vec<&str> = identity.custom.keys().map(String::as_str).collect();
        tracing::info!(
            token = %fingerprint(token),
            subject = %fingerprint(identity.uid()),
            ?claims,
            "bearer token verified"
        );
    }
}
