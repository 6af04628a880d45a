/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth: firebase-auth policy の実体 (AuthGate)
 * - http: request-id / trace / timeout などの横断的な layer
 */
pub mod auth;
pub mod http;
