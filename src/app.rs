/*
 * Responsibility
 * - tracing 初期化 → Config 読み込み → plugin 読み込み (verifier 生成) → Router 組み立て
 * - protected ルートへの firebase-auth policy 適用、HTTP 横断 middleware の適用
 * - axum::serve() で起動、Ctrl-C で graceful shutdown
 */
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::{
    api,
    config::Config,
    middleware,
    plugin::{FirebaseAuthPlugin, PluginError, PolicyRegistry, firebase_auth::POLICY_NAME},
    services::verifier::FirebaseVerifierProvider,
};

pub async fn run() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    let plugin = FirebaseAuthPlugin::new(
        Arc::new(FirebaseVerifierProvider::new(
            config.firebase.clone(),
            config.gate.verify_timeout,
        )),
        config.gate,
    );

    // Without a verifier the gate cannot run: fail startup.
    let mut registry = PolicyRegistry::new();
    registry
        .load(&plugin)
        .await
        .context("failed to initialize firebase-auth plugin")?;

    let app = build_router(&registry, &config)?;

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, env = ?config.app_env, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_router(registry: &PolicyRegistry, config: &Config) -> Result<Router, PluginError> {
    let protected =
        registry.apply(POLICY_NAME, &serde_json::Value::Null, api::v1::protected_routes())?;

    let v1 = api::v1::public_routes().merge(protected);
    let app = Router::new().nest("/api/v1", v1);

    Ok(middleware::http::apply(app, config.http_request_timeout))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
