use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::middleware::auth::GateError;
use crate::services::verifier::Identity;

/// Handler で、検証済みの Identity を受け取るための extractor
/// firebase-auth policy が Identity を request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す (policy 未適用のルート)
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized(GateError::MissingOrMalformedHeader))
    }
}
