//! Trust stores resolving credentials to identities.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use subtle::ConstantTimeEq;

use super::Identity;
use crate::config::ApiKeyEntry;
use crate::error::{GatewayError, Result};

/// Resolves a credential to the identity that owns it.
///
/// `Ok(None)` means the credential is unknown or expired. `Err` means the
/// store itself could not answer.
pub trait TrustStore: Send + Sync {
    /// Look up `credential`.
    fn resolve<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Identity>>> + Send + 'a>>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}

/// Keys held in memory, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustStore {
    keys: Vec<(Vec<u8>, Identity)>,
}

impl StaticTrustStore {
    /// Create from configured entries
    pub fn from_entries(entries: &[ApiKeyEntry]) -> Self {
        Self {
            keys: entries
                .iter()
                .map(|e| (e.key.as_bytes().to_vec(), Identity::new(e.identity.clone())))
                .collect(),
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lookup(&self, credential: &str) -> Option<Identity> {
        let presented = credential.as_bytes();
        let mut found = None;
        // Every key is compared so the scan time does not depend on the match position.
        for (key, identity) in &self.keys {
            if bool::from(key.as_slice().ct_eq(presented)) && found.is_none() {
                found = Some(identity.clone());
            }
        }
        found
    }
}

impl TrustStore for StaticTrustStore {
    fn resolve<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Identity>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.lookup(credential)) })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Verifies credentials against a remote endpoint.
///
/// The credential is sent as a bearer token. A 2xx answer resolves to the
/// `identity`, `user_id` or `id` field of the JSON body. 401 and 403 mean the
/// credential is unknown. A 2xx answer that names no identity, or names the
/// credential itself, is an upstream failure: the identity is logged and
/// keyed on, so it must never be the secret.
#[derive(Debug, Clone)]
pub struct RemoteTrustStore {
    client: reqwest::Client,
    verify_url: String,
}

impl RemoteTrustStore {
    /// Create a store calling `verify_url`
    pub fn new(client: reqwest::Client, verify_url: String) -> Self {
        Self { client, verify_url }
    }
}

impl TrustStore for RemoteTrustStore {
    fn resolve<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Identity>>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.verify_url)
                .bearer_auth(credential)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
            {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(GatewayError::Upstream(format!(
                    "credential verification returned {status}"
                )));
            }

            let body: Value = response.json().await.map_err(|e| {
                GatewayError::Upstream(format!("credential verification body is not JSON: {e}"))
            })?;
            let identity = identity_field(&body).ok_or_else(|| {
                GatewayError::Upstream("credential verification named no identity".to_string())
            })?;
            if bool::from(identity.as_bytes().ct_eq(credential.as_bytes())) {
                return Err(GatewayError::Upstream(
                    "credential verification echoed the credential as identity".to_string(),
                ));
            }

            Ok(Some(Identity::new(identity)))
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

fn identity_field(body: &Value) -> Option<&str> {
    ["identity", "user_id", "id"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .filter(|identity| !identity.is_empty())
}
