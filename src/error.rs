/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body `{"error": "..."}`)
 * - 認証拒否の理由を外部向けメッセージへ統一的に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::middleware::auth::GateError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] GateError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Client-facing message. Verifier causes are never included.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::Unauthorized(GateError::MissingOrMalformedHeader) => {
                "Unauthorized: Missing or invalid token"
            }
            AppError::Unauthorized(GateError::VerificationFailed) => "Invalid or expired token",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.public_message().to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}
