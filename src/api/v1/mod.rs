/*
 * Responsibility
 * - v1 の公開ポイント (public / protected router の re-export)
 */
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::{protected_routes, public_routes};
