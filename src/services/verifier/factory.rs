/// Factory: build the Firebase verifier client from application `Config`.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use crate::config::FirebaseSettings;
use crate::services::verifier::jwks::KeySource;
use crate::services::verifier::{
    FirebaseVerifier, TokenVerifier, VerifierInitError, VerifierProvider,
};

/// Upper bound for one JWK set request.
const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct FirebaseVerifierProvider {
    settings: FirebaseSettings,
    fetch_timeout: Duration,
}

impl FirebaseVerifierProvider {
    /// `verify_timeout` is the gate's per-request budget. A key fetch must end
    /// well inside it so the gate sees the fetch error rather than its own timeout.
    pub fn new(settings: FirebaseSettings, verify_timeout: Duration) -> Self {
        Self {
            settings,
            fetch_timeout: KEY_FETCH_TIMEOUT.min(verify_timeout * 4 / 5),
        }
    }

    fn key_source(&self) -> Result<KeySource, VerifierInitError> {
        if let Some(path) = &self.settings.jwks_file {
            return Ok(KeySource::Static(load_key_file(path)?));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.fetch_timeout)
            .timeout(self.fetch_timeout)
            .build()?;

        Ok(KeySource::Remote {
            client,
            url: self.settings.jwks_url.clone(),
        })
    }
}

fn load_key_file(path: &Path) -> Result<JwkSet, VerifierInitError> {
    let key_file_error = |reason: String| VerifierInitError::KeyFile {
        path: path.display().to_string(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| key_file_error(e.to_string()))?;
    let set: JwkSet = serde_json::from_str(&raw).map_err(|e| key_file_error(e.to_string()))?;

    if set.keys.is_empty() {
        return Err(key_file_error("no keys".into()));
    }
    Ok(set)
}

#[async_trait]
impl VerifierProvider for FirebaseVerifierProvider {
    async fn connect(&self) -> Result<Arc<dyn TokenVerifier>, VerifierInitError> {
        if self.settings.project_id.trim().is_empty() {
            return Err(VerifierInitError::Config("empty project id".into()));
        }

        let source = self.key_source()?;
        let verifier = FirebaseVerifier::from_settings(&self.settings, source);

        match &self.settings.jwks_file {
            Some(path) => tracing::info!(
                project_id = verifier.project_id(),
                jwks_file = %path.display(),
                "firebase verifier initialized"
            ),
            None => tracing::info!(
                project_id = verifier.project_id(),
                jwks_url = %self.settings.jwks_url,
                fetch_timeout_ms = self.fetch_timeout.as_millis() as u64,
                "firebase verifier initialized"
            ),
        }

        Ok(Arc::new(verifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FIREBASE_JWKS_URL;
    use crate::services::verifier::firebase::tests::{
        KID, PROJECT, sign, test_jwks, valid_claims,
    };
    use std::path::PathBuf;

    const GATE_TIMEOUT: Duration = Duration::from_secs(5);

    fn settings(project_id: &str) -> FirebaseSettings {
        FirebaseSettings {
            project_id: project_id.to_string(),
            jwks_url: DEFAULT_FIREBASE_JWKS_URL.parse().unwrap(),
            jwks_file: None,
            clock_skew_seconds: 60,
        }
    }

    fn write_key_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.json", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn connect_builds_a_verifier() {
        let provider = FirebaseVerifierProvider::new(settings("demo"), GATE_TIMEOUT);
        assert!(provider.connect().await.is_ok());
    }

    #[tokio::test]
    async fn empty_project_is_an_init_error() {
        let provider = FirebaseVerifierProvider::new(settings(" "), GATE_TIMEOUT);
        let err = provider.connect().await.err().unwrap();
        assert!(matches!(err, VerifierInitError::Config(_)));
    }

    #[test]
    fn key_fetch_ends_before_the_gate_gives_up() {
        let provider = FirebaseVerifierProvider::new(settings("demo"), GATE_TIMEOUT);
        assert_eq!(provider.fetch_timeout, KEY_FETCH_TIMEOUT);
        assert!(provider.fetch_timeout < GATE_TIMEOUT);

        let tight = Duration::from_millis(500);
        let provider = FirebaseVerifierProvider::new(settings("demo"), tight);
        assert_eq!(provider.fetch_timeout, Duration::from_millis(400));
    }

    #[tokio::test]
    async fn key_file_source_verifies_without_network() {
        let json = serde_json::to_string(&test_jwks(KID)).unwrap();
        let path = write_key_file("gate-jwks", &json);

        let mut settings = settings(PROJECT);
        settings.jwks_url = "http://127.0.0.1:9/unused".parse().unwrap();
        settings.jwks_file = Some(path.clone());

        let verifier = FirebaseVerifierProvider::new(settings, GATE_TIMEOUT)
            .connect()
            .await
            .unwrap();
        let identity = verifier
            .verify(&sign(&valid_claims("file-user"), Some(KID)))
            .await
            .unwrap();

        assert_eq!(identity.uid(), "file-user");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn unusable_key_file_is_an_init_error() {
        let mut missing = settings(PROJECT);
        missing.jwks_file = Some(PathBuf::from("/nonexistent/jwks.json"));
        let err = FirebaseVerifierProvider::new(missing, GATE_TIMEOUT)
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VerifierInitError::KeyFile { .. }));

        let path = write_key_file("gate-jwks-empty", r#"{"keys": []}"#);
        let mut empty = settings(PROJECT);
        empty.jwks_file = Some(path.clone());
        let err = FirebaseVerifierProvider::new(empty, GATE_TIMEOUT)
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VerifierInitError::KeyFile { .. }));
        std::fs::remove_file(path).ok();
    }
}
