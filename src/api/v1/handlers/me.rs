/*
 * Responsibility
 * - GET /me: firebase-auth policy が載せた Identity をそのまま返す
 * - policy の配線確認用 (downstream は extensions から Identity を読むだけ)
 */
use axum::Json;

use crate::api::v1::extractors::AuthUser;
use crate::services::verifier::Identity;

pub async fn me(AuthUser(identity): AuthUser) -> Json<Identity> {
    Json(identity)
}
