/*
 * Responsibility
 * - firebase-auth plugin (manifest + init)
 * - verifier client をプロセスで 1 つだけ生成し (OnceCell)、init を何度呼んでも再利用する
 * - policy factory は action params を受けるが使わない (AuthGate を返すだけ)
 */
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::OnceCell;

use crate::config::GateSettings;
use crate::middleware::auth::{AuthGate, gate};
use crate::plugin::{
    Plugin, PluginContext, PluginError, PluginManifest, PolicyHandler, PolicyRegistration,
};
use crate::services::verifier::{TokenVerifier, VerifierProvider};

pub const PLUGIN_NAME: &str = "firebase-auth";
pub const POLICY_NAME: &str = "firebase-auth";

pub struct FirebaseAuthPlugin {
    provider: Arc<dyn VerifierProvider>,
    verifier: OnceCell<Arc<dyn TokenVerifier>>,
    settings: GateSettings,
}

impl std::fmt::Debug for FirebaseAuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuthPlugin")
            .field("initialized", &self.verifier.initialized())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FirebaseAuthPlugin {
    pub fn new(provider: Arc<dyn VerifierProvider>, settings: GateSettings) -> Self {
        Self {
            provider,
            verifier: OnceCell::new(),
            settings,
        }
    }

    /// Existing verifier client, or a new one if this is the first call.
    async fn verifier(&self) -> Result<Arc<dyn TokenVerifier>, PluginError> {
        let verifier = self
            .verifier
            .get_or_try_init(|| self.provider.connect())
            .await?;
        Ok(verifier.clone())
    }
}

/// The handler the `firebase-auth` policy factory returns.
struct FirebaseAuthPolicy {
    gate: AuthGate,
}

impl PolicyHandler for FirebaseAuthPolicy {
    fn apply(&self, router: Router) -> Router {
        gate::apply(router, self.gate.clone())
    }
}

#[async_trait]
impl Plugin for FirebaseAuthPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: PLUGIN_NAME,
            version: env!("CARGO_PKG_VERSION"),
            policies: &[POLICY_NAME],
        }
    }

    async fn init(&self, ctx: &mut dyn PluginContext) -> Result<(), PluginError> {
        let verifier = self.verifier().await?;
        let settings = self.settings;

        ctx.register_policy(PolicyRegistration {
            name: POLICY_NAME,
            factory: Arc::new(
                move |_action_params: &serde_json::Value| -> Box<dyn PolicyHandler> {
                    Box::new(FirebaseAuthPolicy {
                        gate: AuthGate::new(verifier.clone(), settings),
                    })
                },
            ),
        });

        Ok(())
    }
}
