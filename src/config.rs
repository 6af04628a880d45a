/*
 * Responsibility
 * - 環境変数の読み込み (PORT, APP_ENV, Firebase project id, timeout など)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Google's published signing keys for Firebase ID tokens (JWK set).
pub const DEFAULT_FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Opt-in diagnostics for the auth gate.
///
/// `Redacted` logs a token fingerprint and claim names, never raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticMode {
    #[default]
    Off,
    Redacted,
}

impl DiagnosticMode {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "off" | "false" | "0" => Ok(Self::Off),
            "redacted" | "on" | "true" | "1" => Ok(Self::Redacted),
            _ => Err(ConfigError::Invalid("AUTH_DIAGNOSTICS")),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub http_request_timeout: Duration,

    pub firebase: FirebaseSettings,
    pub gate: GateSettings,
}

/// Settings for the Firebase ID-token verifier.
#[derive(Debug, Clone)]
pub struct FirebaseSettings {
    pub project_id: String,
    pub jwks_url: Url,
    /// Local JWK set file; when set, keys are never fetched from `jwks_url`.
    pub jwks_file: Option<PathBuf>,
    pub clock_skew_seconds: u64,
}

/// Settings for the per-request gate.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub verify_timeout: Duration,
    pub diagnostics: DiagnosticMode,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            verify_timeout: Duration::from_secs(5),
            diagnostics: DiagnosticMode::Off,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = lookup("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let http_request_timeout = Duration::from_secs(
            parse_or(&lookup, "HTTP_REQUEST_TIMEOUT_SECONDS", 30)?,
        );

        // Ambient project resolution, same order the Google SDKs use.
        let explicit_project = ["FIREBASE_PROJECT_ID", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]
            .iter()
            .filter_map(|key| lookup(*key))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());
        let project_id = match explicit_project {
            Some(project_id) => project_id,
            None => project_from_credentials(&lookup)?
                .ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?,
        };

        let jwks_url = lookup("FIREBASE_JWKS_URL")
            .unwrap_or_else(|| DEFAULT_FIREBASE_JWKS_URL.to_string());
        let jwks_url = Url::parse(jwks_url.trim())
            .map_err(|_| ConfigError::Invalid("FIREBASE_JWKS_URL"))?;

        let jwks_file = lookup("FIREBASE_JWKS_FILE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let clock_skew_seconds = parse_or(&lookup, "AUTH_CLOCK_SKEW_SECONDS", 60)?;

        let verify_timeout_ms = parse_or(&lookup, "AUTH_VERIFY_TIMEOUT_MS", 5000)?;
        if verify_timeout_ms == 0 {
            return Err(ConfigError::Invalid("AUTH_VERIFY_TIMEOUT_MS"));
        }

        let mut diagnostics = match lookup("AUTH_DIAGNOSTICS") {
            Some(raw) => DiagnosticMode::parse(&raw)?,
            None => DiagnosticMode::Off,
        };
        if app_env.is_production() && diagnostics != DiagnosticMode::Off {
            tracing::warn!("AUTH_DIAGNOSTICS is ignored when APP_ENV=production");
            diagnostics = DiagnosticMode::Off;
        }

        Ok(Self {
            addr,
            app_env,
            http_request_timeout,
            firebase: FirebaseSettings {
                project_id,
                jwks_url,
                jwks_file,
                clock_skew_seconds,
            },
            gate: GateSettings {
                verify_timeout: Duration::from_millis(verify_timeout_ms),
                diagnostics,
            },
        })
    }
}

/// Subset of an Application Default Credentials (service account) file.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    project_id: Option<String>,
}

/// `project_id` from the file named by `GOOGLE_APPLICATION_CREDENTIALS`, if any.
fn project_from_credentials<F>(lookup: &F) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEY: &str = "GOOGLE_APPLICATION_CREDENTIALS";

    let Some(path) = lookup(KEY).map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };

    let raw = std::fs::read_to_string(&path).map_err(|_| ConfigError::Invalid(KEY))?;
    let credentials: CredentialsFile =
        serde_json::from_str(&raw).map_err(|_| ConfigError::Invalid(KEY))?;

    Ok(credentials
        .project_id
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty()))
}

fn parse_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
