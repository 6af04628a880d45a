/*
 * Responsibility
 * - 検証済みトークンの claim set (Identity) の型
 * - verifier が返し、gate が request extensions に載せ、handler が読む
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded claims of a verified ID token.
///
/// Registered claims are typed; anything else the provider (or a custom-claims
/// admin call) put into the token lands in `custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub sub: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase: Option<FirebaseClaim>,

    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// The `firebase` claim block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirebaseClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub identities: Value,
}

impl Identity {
    /// Firebase calls the subject the user's `uid`.
    pub fn uid(&self) -> &str {
        &self.sub
    }
}

#[cfg(test)]
impl Identity {
    /// Minimal identity (subject + expiry); the rest left empty.
    pub fn new(sub: impl Into<String>, exp: u64) -> Self {
        Self {
            sub: sub.into(),
            iss: String::new(),
            aud: String::new(),
            exp,
            iat: None,
            auth_time: None,
            email: None,
            email_verified: None,
            firebase: None,
            custom: BTreeMap::new(),
        }
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.custom.insert(name.into(), value);
        self
    }
}
