/*
 * Responsibility
 * - Firebase ID token の検証 (RS256 署名, aud, iss, exp, iat, auth_time, sub)
 * - jsonwebtoken のエラーを VerifyError に写像する
 */
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};

use crate::config::FirebaseSettings;
use crate::services::verifier::jwks::{KeyCache, KeySource};
use crate::services::verifier::{Identity, TokenVerifier, VerifyError};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Firebase allows uids of up to 128 characters.
const MAX_SUB_LEN: usize = 128;

/// Firebase Authentication ID-token verifier.
///
/// Checks what the Admin SDK's `verifyIdToken` checks:
/// - RS256 signature against Google's published keys (by `kid`)
/// - `exp` / `iat` / `auth_time` against the clock, with leeway
/// - `aud` is the project id, `iss` is the project's securetoken issuer
/// - `sub` is non-empty and at most 128 characters
pub struct FirebaseVerifier {
    project_id: String,
    keys: KeyCache,
    validation: Validation,
}

impl std::fmt::Debug for FirebaseVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseVerifier")
            .field("project_id", &self.project_id)
            .field("keys", &self.keys)
            .finish()
    }
}

impl FirebaseVerifier {
    pub fn new(project_id: &str, clock_skew_seconds: u64, source: KeySource) -> Self {
        let issuer = format!("{ISSUER_PREFIX}{project_id}");

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[project_id]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation.leeway = clock_skew_seconds;

        Self {
            project_id: project_id.to_string(),
            keys: KeyCache::new(source),
            validation,
        }
    }

    pub fn from_settings(settings: &FirebaseSettings, source: KeySource) -> Self {
        Self::new(&settings.project_id, settings.clock_skew_seconds, source)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn check_times(&self, identity: &Identity) -> Result<(), VerifyError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let latest = now + self.validation.leeway;

        match identity.iat {
            Some(iat) if iat <= latest => {}
            Some(_) => return Err(VerifyError::InvalidClaim("iat is in the future".into())),
            None => return Err(VerifyError::InvalidClaim("missing iat".into())),
        }

        match identity.auth_time {
            Some(auth_time) if auth_time <= latest => Ok(()),
            Some(_) => Err(VerifyError::InvalidClaim("auth_time is in the future".into())),
            None => Err(VerifyError::InvalidClaim("missing auth_time".into())),
        }
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let header = jsonwebtoken::decode_header(token).map_err(map_jwt_error)?;

        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let key = self.keys.decoding_key(&kid).await?;

        let identity = jsonwebtoken::decode::<Identity>(token, &key, &self.validation)
            .map_err(map_jwt_error)?
            .claims;

        if identity.sub.is_empty() {
            return Err(VerifyError::InvalidClaim("empty sub".into()));
        }
        if identity.sub.chars().count() > MAX_SUB_LEN {
            return Err(VerifyError::InvalidClaim("sub longer than 128 characters".into()));
        }
        self.check_times(&identity)?;

        Ok(identity)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => VerifyError::UnsupportedAlgorithm("mismatch".into()),
        ErrorKind::InvalidAudience => VerifyError::InvalidClaim("aud".into()),
        ErrorKind::InvalidIssuer => VerifyError::InvalidClaim("iss".into()),
        ErrorKind::ImmatureSignature => VerifyError::InvalidClaim("nbf".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            VerifyError::InvalidClaim(format!("missing {claim}"))
        }
        _ => VerifyError::Malformed(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use axum::{Json, Router, http::header, routing::get};
    use jsonwebtoken::jwk::{
        AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
        RSAKeyParameters, RSAKeyType,
    };
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const PROJECT: &str = "demo-project";
    pub(crate) const KID: &str = "test-key-1";

    const TEST_KEY_PEM: &str = include_str!("testdata/test_rsa_key.pem");
    const TEST_KEY_MODULUS: &str = concat!(
        "qHbMc9ZxnlD5n_EAf2L16-eN73KkD1fdnTbfaYKhsb7HjL1_ypTEvCprf18fXUu5z3jn3BVBiwOCwft846_",
        "TC3hvhw8VDOxGSsH_VWW1P3Kml7Y5HbHfIGLNrJrCHT31ZMkeGu2_3qGis_78xf9B0px9c655LyLvses_Q0o",
        "DRepzmZZ_vXlXPEfqjmgLrVtg9WkO4rVJ-EJ3XeEftjzCZCrDGhaI4_l28r91_yT0ehRklfizc0OqBWBf37M",
        "-wUeQO-947KwUH6T96CJn6qwEtrOkO0qe5rUbN9CbukKQ6qToFwh9-fWj6uWU43IpNE1ZMmFUXZqxs4CE2EnLag",
        "tESQ",
    );

    pub(crate) fn test_jwks(kid: &str) -> JwkSet {
        JwkSet {
            keys: vec![Jwk {
                common: CommonParameters {
                    public_key_use: Some(PublicKeyUse::Signature),
                    key_algorithm: Some(KeyAlgorithm::RS256),
                    key_id: Some(kid.to_string()),
                    ..Default::default()
                },
                algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                    key_type: RSAKeyType::RSA,
                    n: TEST_KEY_MODULUS.to_string(),
                    e: "AQAB".to_string(),
                }),
            }],
        }
    }

    fn now() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    pub(crate) fn valid_claims(sub: &str) -> Value {
        let now = now();
        json!({
            "iss": format!("{ISSUER_PREFIX}{PROJECT}"),
            "aud": PROJECT,
            "sub": sub,
            "user_id": sub,
            "iat": now - 10,
            "auth_time": now - 10,
            "exp": now + 3600,
            "email": "user@example.com",
            "email_verified": true,
            "firebase": { "sign_in_provider": "password", "identities": {} }
        })
    }

    pub(crate) fn sign(claims: &Value, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    fn static_verifier() -> FirebaseVerifier {
        FirebaseVerifier::new(PROJECT, 60, KeySource::Static(test_jwks(KID)))
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let token = sign(&valid_claims("u1"), Some(KID));

        let identity = static_verifier().verify(&token).await.unwrap();

        assert_eq!(identity.uid(), "u1");
        assert_eq!(identity.aud, PROJECT);
        assert_eq!(identity.email.as_deref(), Some("user@example.com"));
        assert_eq!(identity.custom.get("user_id"), Some(&json!("u1")));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let mut claims = valid_claims("u1");
        claims["exp"] = json!(now() - 3600);
        let token = sign(&claims, Some(KID));

        let err = static_verifier().verify(&token).await.unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }

    #[tokio::test]
    async fn rejects_wrong_audience_and_issuer() {
        let mut claims = valid_claims("u1");
        claims["aud"] = json!("other-project");
        let err = static_verifier()
            .verify(&sign(&claims, Some(KID)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidClaim(_)));

        let mut claims = valid_claims("u1");
        claims["iss"] = json!("https://securetoken.google.com/other-project");
        let err = static_verifier()
            .verify(&sign(&claims, Some(KID)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidClaim(_)));
    }

    #[tokio::test]
    async fn rejects_bad_subject_and_future_auth_time() {
        let long_sub = "x".repeat(129);
        let err = static_verifier()
            .verify(&sign(&valid_claims(&long_sub), Some(KID)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidClaim(_)));

        let mut claims = valid_claims("u1");
        claims["auth_time"] = json!(now() + 3600);
        let err = static_verifier()
            .verify(&sign(&claims, Some(KID)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidClaim(_)));
    }

    #[tokio::test]
    async fn rejects_missing_or_unknown_kid() {
        let claims = valid_claims("u1");

        let err = static_verifier().verify(&sign(&claims, None)).await.unwrap_err();
        assert!(matches!(err, VerifyError::MissingKeyId));

        let err = static_verifier()
            .verify(&sign(&claims, Some("rotated-away")))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnknownKeyId(_)));
    }

    #[tokio::test]
    async fn rejects_tampered_signature_and_garbage() {
        let token = sign(&valid_claims("u1"), Some(KID));
        let (head, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{head}.{flipped}{}", &sig[1..]);

        let err = static_verifier().verify(&tampered).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::InvalidSignature | VerifyError::Malformed(_)
        ));

        let err = static_verifier().verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, VerifyError::Malformed(_)));
    }

    #[tokio::test]
    async fn remote_keys_are_fetched_once_and_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let app = Router::new().route(
            "/jwks",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        [(header::CACHE_CONTROL, "public, max-age=3600")],
                        Json(test_jwks(KID)),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let verifier = FirebaseVerifier::new(
            PROJECT,
            60,
            KeySource::Remote {
                client: reqwest::Client::new(),
                url: format!("http://{addr}/jwks").parse().unwrap(),
            },
        );

        let token = sign(&valid_claims("u1"), Some(KID));
        verifier.verify(&token).await.unwrap();
        verifier.verify(&token).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_key_endpoint_is_unavailable() {
        let verifier = FirebaseVerifier::new(
            PROJECT,
            60,
            KeySource::Remote {
                client: reqwest::Client::new(),
                url: "http://127.0.0.1:9/jwks".parse().unwrap(),
            },
        );

        let err = verifier
            .verify(&sign(&valid_claims("u1"), Some(KID)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Unavailable(_)));
    }
}
