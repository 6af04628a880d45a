//! Signing-key cache for the identity provider's published JWK set.
//!
//! Keys are fetched over HTTPS and kept for the `Cache-Control: max-age`
//! lifetime the provider advertises. A token naming an unknown `kid` forces
//! one refresh, which covers key rotation between scheduled refreshes. When a
//! refresh fails the previous keys stay in use and the next attempt waits
//! [`RETRY_AFTER_FAILED_REFRESH`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, header};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use url::Url;

use super::VerifyError;

/// Used when the provider response carries no usable max-age.
const FALLBACK_TTL: Duration = Duration::from_secs(60 * 60);

/// Lower bound between forced refreshes triggered by unknown kids.
const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// How long stale keys are served after a failed refresh before trying again.
const RETRY_AFTER_FAILED_REFRESH: Duration = Duration::from_secs(30);

/// Where signing keys come from.
#[derive(Debug, Clone)]
pub enum KeySource {
    Remote { client: reqwest::Client, url: Url },
    /// Fixed key set that never expires (`FIREBASE_JWKS_FILE`, tests).
    Static(JwkSet),
}

struct CachedKeys {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    expires_at: Option<Instant>,
}

impl CachedKeys {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

pub struct KeyCache {
    source: KeySource,
    cached: RwLock<Option<CachedKeys>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl KeyCache {
    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Resolve `kid` to a decoding key, fetching or refreshing the set as needed.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        let now = Instant::now();

        {
            let cached = self.cached.read().await;
            if let Some(cached) = cached.as_ref().filter(|c| c.is_fresh(now)) {
                if let Some(jwk) = cached.keys.get(kid) {
                    return to_decoding_key(jwk);
                }
                if now.duration_since(cached.fetched_at) < MIN_FORCED_REFRESH_INTERVAL {
                    return Err(VerifyError::UnknownKeyId(kid.to_string()));
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another request may have refreshed while we waited for the lock.
        let refreshed_meanwhile = cached
            .as_ref()
            .is_some_and(|c| c.is_fresh(now) && c.fetched_at > now);
        if !refreshed_meanwhile {
            match self.fetch().await {
                Ok(fresh) => *cached = Some(fresh),
                Err(err) => {
                    let Some(stale) = cached.as_mut() else {
                        return Err(err);
                    };
                    tracing::warn!(error = %err, "signing key refresh failed, keeping cached keys");
                    let retry_from = Instant::now();
                    stale.fetched_at = retry_from;
                    stale.expires_at = Some(retry_from + RETRY_AFTER_FAILED_REFRESH);
                }
            }
        }

        let jwk = cached
            .as_ref()
            .and_then(|c| c.keys.get(kid))
            .ok_or_else(|| VerifyError::UnknownKeyId(kid.to_string()))?;

        to_decoding_key(jwk)
    }

    async fn fetch(&self) -> Result<CachedKeys, VerifyError> {
        let fetched_at = Instant::now();

        let (set, ttl) = match &self.source {
            KeySource::Static(set) => (set.clone(), None),
            KeySource::Remote { client, url } => {
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| VerifyError::Unavailable(format!("jwks fetch failed: {e}")))?;

                let ttl = max_age(response.headers()).unwrap_or(FALLBACK_TTL);

                let set: JwkSet = response
                    .json()
                    .await
                    .map_err(|e| VerifyError::Unavailable(format!("jwks decode failed: {e}")))?;

                (set, Some(ttl))
            }
        };

        let keys = set
            .keys
            .into_iter()
            .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
            .collect::<HashMap<_, _>>();

        tracing::debug!(keys = keys.len(), "signing keys refreshed");

        Ok(CachedKeys {
            keys,
            fetched_at,
            expires_at: ttl.map(|ttl| fetched_at + ttl),
        })
    }
}

fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, VerifyError> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| VerifyError::Unavailable(format!("unusable signing key: {e}")))
}

/// `max-age` from a `Cache-Control` header, if present and non-zero.
pub fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|directive| {
            let (name, value) = directive.trim().split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            value.trim().trim_matches('"').parse::<u64>().ok()
        })
        .find(|secs| *secs > 0)
        .map(Duration::from_secs)
}
