//! Token verification: the seam between the auth gate and the identity provider.
//!
//! The gate only depends on [`TokenVerifier`]. The Firebase implementation lives
//! in [`firebase`]; [`factory`] builds it from `Config` once per process.

pub mod factory;
pub mod firebase;
pub mod identity;
pub mod jwks;

use std::sync::Arc;

use async_trait::async_trait;

pub use factory::FirebaseVerifierProvider;
pub use firebase::FirebaseVerifier;
pub use identity::Identity;

/// Why a token was not accepted.
///
/// Display strings never contain the token itself.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token header has no kid")]
    MissingKeyId,
    #[error("no signing key for kid {0}")]
    UnknownKeyId(String),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid token claim: {0}")]
    InvalidClaim(String),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("verification timed out")]
    Timeout,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure to construct the process-wide verifier client. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum VerifierInitError {
    #[error("verifier configuration error: {0}")]
    Config(String),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to load signing keys from {path}: {reason}")]
    KeyFile { path: String, reason: String },
}

/// Verifies a bearer token and returns its decoded claims.
///
/// Implementations are shared across all in-flight requests.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Builds the verifier client. Called at most once per plugin instance.
#[async_trait]
pub trait VerifierProvider: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn TokenVerifier>, VerifierInitError>;
}
