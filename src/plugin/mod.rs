//! Gateway plugin contract.
//!
//! A plugin declares a manifest (name, version, the policies it provides) and
//! an `init` entry point. `init` receives a [`PluginContext`] and registers
//! policies on it. A policy is a factory: given the pipeline's action
//! parameters it returns a [`PolicyHandler`] that wraps a router.

pub mod firebase_auth;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::services::verifier::VerifierInitError;

pub use firebase_auth::FirebaseAuthPlugin;
pub use registry::PolicyRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    pub name: &'static str,
    pub version: &'static str,
    pub policies: &'static [&'static str],
}

/// Per-request logic produced by a policy factory.
pub trait PolicyHandler: Send + Sync {
    fn apply(&self, router: Router) -> Router;
}

/// Builds a handler from action parameters (free-form JSON from the pipeline).
pub type PolicyFactory =
    Arc<dyn Fn(&serde_json::Value) -> Box<dyn PolicyHandler> + Send + Sync>;

pub struct PolicyRegistration {
    pub name: &'static str,
    pub factory: PolicyFactory,
}

impl std::fmt::Debug for PolicyRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What the host hands to `Plugin::init`.
pub trait PluginContext: Send {
    fn register_policy(&mut self, policy: PolicyRegistration);
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> PluginManifest;

    async fn init(&self, ctx: &mut dyn PluginContext) -> Result<(), PluginError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error(transparent)]
    VerifierInit(#[from] VerifierInitError),
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),
    #[error("plugin {plugin} declares policy {policy} but did not register it")]
    PolicyNotRegistered {
        plugin: &'static str,
        policy: &'static str,
    },
}
