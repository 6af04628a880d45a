use std::collections::HashMap;

use axum::Router;

use crate::plugin::{
    Plugin, PluginContext, PluginError, PluginManifest, PolicyFactory, PolicyHandler,
    PolicyRegistration,
};

/// Host side of the plugin contract: loads plugins and hands out policies.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: HashMap<&'static str, PolicyFactory>,
    plugins: Vec<PluginManifest>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .field("plugins", &self.plugins)
            .finish()
    }
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the plugin's `init` and check it registered every policy it declares.
    pub async fn load(&mut self, plugin: &dyn Plugin) -> Result<(), PluginError> {
        let manifest = plugin.manifest();

        plugin.init(self).await?;

        if let Some(missing) = manifest
            .policies
            .iter()
            .find(|name| !self.policies.contains_key(*name))
        {
            return Err(PluginError::PolicyNotRegistered {
                plugin: manifest.name,
                policy: *missing,
            });
        }

        tracing::info!(
            plugin = manifest.name,
            version = manifest.version,
            policies = ?manifest.policies,
            "plugin loaded"
        );

        if !self.plugins.contains(&manifest) {
            self.plugins.push(manifest);
        }
        Ok(())
    }

    pub fn policy(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn PolicyHandler>, PluginError> {
        let factory = self
            .policies
            .get(name)
            .ok_or_else(|| PluginError::UnknownPolicy(name.to_string()))?;
        Ok(factory(params))
    }

    /// Wrap `router` with the named policy.
    pub fn apply(
        &self,
        name: &str,
        params: &serde_json::Value,
        router: Router,
    ) -> Result<Router, PluginError> {
        Ok(self.policy(name, params)?.apply(router))
    }
}

#[cfg(test)]
impl PolicyRegistry {
    pub fn plugins(&self) -> &[PluginManifest] {
        &self.plugins
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }
}

impl PluginContext for PolicyRegistry {
    fn register_policy(&mut self, policy: PolicyRegistration) {
        if self.policies.insert(policy.name, policy.factory).is_some() {
            tracing::debug!(policy = policy.name, "policy re-registered");
        }
    }
}
