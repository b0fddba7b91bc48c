//! Request authentication.
//!
//! The [`AuthValidator`] pulls a credential out of a configurable header and
//! asks a [`TrustStore`] which identity it belongs to. Two stores ship with
//! the gateway:
//!
//! - [`StaticTrustStore`]: keys listed in configuration, compared in constant time
//! - [`RemoteTrustStore`]: asks a verification endpoint over HTTP

mod store;

pub use store::{RemoteTrustStore, StaticTrustStore, TrustStore};

use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::AuthConfig;
use crate::error::{GatewayError, Result};
use crate::transport::RequestDescriptor;
use crate::verdict::{Denial, Verdict};

/// The principal a request is billed and limited against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The identity key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks request credentials against a trust store.
#[derive(Clone)]
pub struct AuthValidator {
    header: HeaderName,
    store: Arc<dyn TrustStore>,
}

impl std::fmt::Debug for AuthValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthValidator")
            .field("header", &self.header)
            .field("store", &self.store.name())
            .finish()
    }
}

impl AuthValidator {
    /// Create a validator reading `header` and resolving through `store`
    pub fn new(header: HeaderName, store: Arc<dyn TrustStore>) -> Self {
        Self { header, store }
    }

    /// Build from configuration; a verification URL takes precedence over static keys.
    pub fn from_config(config: &AuthConfig, client: reqwest::Client) -> Result<Self> {
        let header = HeaderName::from_bytes(config.header.to_ascii_lowercase().as_bytes())
            .map_err(|e| GatewayError::Config(format!("Invalid auth header name: {e}")))?;

        let store: Arc<dyn TrustStore> = match &config.verify_url {
            Some(url) => Arc::new(RemoteTrustStore::new(client, url.clone())),
            None => {
                if config.keys.is_empty() {
                    tracing::warn!("No API keys or verify_url configured; every authenticated route will return 401");
                }
                Arc::new(StaticTrustStore::from_entries(&config.keys))
            },
        };

        Ok(Self::new(header, store))
    }

    /// Resolve the request's credential to an identity.
    ///
    /// Trust store transport failures are returned as errors rather than
    /// denials so the router can surface them as upstream failures.
    ///
    /// The credential is copied out before the returned future runs, so the
    /// future does not borrow the request (whose unread body is not `Sync`).
    pub fn validate(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<Verdict<Identity>>> + Send + '_ {
        let credential = request
            .header(self.header.as_str())
            .and_then(extract_credential)
            .map(str::to_string);

        async move {
            let Some(credential) = credential else {
                return Ok(Verdict::Denied(Denial::unauthenticated("missing credential")));
            };

            match self.store.resolve(&credential).await? {
                Some(identity) => Ok(Verdict::Allowed(identity)),
                None => Ok(Verdict::Denied(Denial::unauthenticated(
                    "invalid or expired credential",
                ))),
            }
        }
    }
}

/// Strip an optional `Bearer ` scheme and surrounding whitespace.
fn extract_credential(value: &str) -> Option<&str> {
    let value = value.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}
