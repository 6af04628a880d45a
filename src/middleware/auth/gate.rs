/*
 * Responsibility
 * - Bearer トークンの検証 (ヘッダ抽出 → verifier 呼び出し → Forward / Reject)
 * - 成功時に Identity を request extensions に載せる
 * - 失敗理由はログのみ (レスポンスには汎用メッセージだけを返す)
 */
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::config::GateSettings;
use crate::error::AppError;
use crate::middleware::auth::diagnostics;
use crate::services::verifier::{Identity, TokenVerifier, VerifyError};

const BEARER_PREFIX: &str = "Bearer ";

/// Reason a request was rejected by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("missing or malformed authorization header")]
    MissingOrMalformedHeader,
    #[error("token verification failed")]
    VerificationFailed,
}

/// Outcome of [`AuthGate::authenticate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Reject(GateError),
}

/// Per-request authentication gate.
///
/// Holds nothing but the shared verifier handle and its settings, so cloning
/// is cheap and all in-flight requests share one verifier.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    settings: GateSettings,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, settings: GateSettings) -> Self {
        Self { verifier, settings }
    }

    /// Decide whether `req` may proceed.
    ///
    /// On `Forward` the verified [`Identity`] is in `req.extensions()`. On
    /// `Reject` the request is left untouched. Dropping the returned future
    /// drops the verifier call with it and nothing is written to `req`.
    pub async fn authenticate<B>(&self, req: &mut Request<B>) -> Decision {
        let outcome = {
            let Some(token) = bearer_token(req.headers()) else {
                tracing::debug!("rejecting request without a bearer token");
                return Decision::Reject(GateError::MissingOrMalformedHeader);
            };

            if token.is_empty() {
                tracing::debug!("rejecting empty bearer token");
                return Decision::Reject(GateError::VerificationFailed);
            }

            diagnostics::before_verify(self.settings.diagnostics, token);
            let outcome = self.verify(token).await;
            if let Ok(identity) = &outcome {
                diagnostics::after_verify(self.settings.diagnostics, token, identity);
            }
            outcome
        };

        match outcome {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
                Decision::Forward
            }
            Err(err) => {
                tracing::warn!(error = %err, "bearer token verification failed");
                Decision::Reject(GateError::VerificationFailed)
            }
        }
    }

    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        tokio::time::timeout(self.settings.verify_timeout, self.verifier.verify(token))
            .await
            .unwrap_or(Err(VerifyError::Timeout))
    }
}

/// Token from `Authorization: Bearer <token>`.
///
/// The prefix is case-sensitive with a single space; the token runs up to the
/// next space, if any. A well-formed prefix followed by nothing yields `""`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix(BEARER_PREFIX)?;
    rest.split(' ').next()
}

/// Wrap `router` so every route behind it passes through the gate.
pub fn apply<S>(router: Router<S>, gate: AuthGate) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(gate, gate_middleware))
}

async fn gate_middleware(
    State(gate): State<AuthGate>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    match gate.authenticate(&mut req).await {
        Decision::Forward => Ok(next.run(req).await),
        Decision::Reject(reason) => Err(reason.into()),
    }
}
