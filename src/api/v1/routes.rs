/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - public (/health) と protected (/me) を分けて返す
 * - protected 側に firebase-auth policy を掛けるのは app.rs の責務
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::{health::health, me::me};

pub fn public_routes() -> Router {
    Router::new().route("/health", get(health))
}

pub fn protected_routes() -> Router {
    Router::new().route("/me", get(me))
}
