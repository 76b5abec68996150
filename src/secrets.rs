//! Secret reference resolution with a TTL cache.
//!
//! Tenant records point at external secrets (object-storage credentials,
//! signing keys) by reference. A reference is either a managed-secret path
//! (`projects/<p>/secrets/<s>[/versions/<v>]`, optionally written with an
//! `sm://` scheme) fetched over HTTP, or a filesystem path.
//!
//! Resolved bytes are cached per reference string. The cache lock is never
//! held across a fetch; concurrent misses for one reference may both fetch
//! and the later insert wins.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::SecretManagerConfig;

const MANAGED_SCHEME: &str = "sm://";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolution failures. Carries the reference, never the secret.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {reference} unavailable: {reason}")]
    Unavailable { reference: String, reason: String },
    #[error("resolution of secret {reference} was cancelled")]
    Cancelled { reference: String },
}

impl SecretError {
    pub fn reference(&self) -> &str {
        match self {
            SecretError::Unavailable { reference, .. } | SecretError::Cancelled { reference } => {
                reference
            }
        }
    }

    fn unavailable(reference: &str, reason: impl Into<String>) -> Self {
        SecretError::Unavailable {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretLocation<'a> {
    /// Fully-qualified managed secret version name
    Managed(String),
    File(&'a Path),
}

impl<'a> SecretLocation<'a> {
    pub fn classify(reference: &'a str) -> Self {
        let candidate = reference.strip_prefix(MANAGED_SCHEME).unwrap_or(reference);
        let is_managed = reference.starts_with(MANAGED_SCHEME)
            || (candidate.starts_with("projects/") && candidate.contains("/secrets/"));

        if !is_managed {
            return SecretLocation::File(Path::new(reference));
        }

        let name = candidate.trim_matches('/');
        if name.contains("/versions/") {
            SecretLocation::Managed(name.to_string())
        } else {
            SecretLocation::Managed(format!("{}/versions/latest", name))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessSecretResponse {
    payload: AccessSecretPayload,
}

#[derive(Debug, Deserialize)]
struct AccessSecretPayload {
    data: String,
}

struct CachedSecret {
    bytes: Zeroizing<Vec<u8>>,
    fetched_at: Instant,
}

/// Resolves secret references, caching each result for the configured TTL.
///
/// One instance is built at bootstrap and shared; [`SecretResolver::clear`]
/// wipes cached material at shutdown.
pub struct SecretResolver {
    client: Client,
    base_url: String,
    access_token: Option<Zeroizing<String>>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedSecret>>,
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretResolver")
            .field("base_url", &self.base_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SecretResolver {
    pub fn new(config: &SecretManagerConfig) -> Result<Self, SecretError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SecretError::unavailable("<client>", e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone().map(Zeroizing::new),
            ttl: Duration::from_secs(config.cache_ttl_seconds),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve `reference` to its bytes.
    ///
    /// Returns a cached value while it is younger than the TTL. The fetch
    /// aborts with [`SecretError::Cancelled`] as soon as `cancel` fires.
    pub async fn resolve(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        if reference.trim().is_empty() {
            return Err(SecretError::unavailable(reference, "empty reference"));
        }

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(reference)
                && entry.fetched_at.elapsed() < self.ttl
            {
                counter!("secret_cache_hits_total").increment(1);
                return Ok(entry.bytes.clone());
            }
        }

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(SecretError::Cancelled {
                    reference: reference.to_string(),
                });
            }
            fetched = self.fetch(reference) => fetched?,
        };

        counter!("secret_fetch_total").increment(1);
        debug!(reference = %reference, "secret resolved");

        self.cache.write().await.insert(
            reference.to_string(),
            CachedSecret {
                bytes: bytes.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(bytes)
    }

    /// Resolve and decode as UTF-8 (service-account JSON, PEM keys).
    pub async fn resolve_string(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Zeroizing<String>, SecretError> {
        let bytes = self.resolve(reference, cancel).await?;
        String::from_utf8(bytes.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| SecretError::unavailable(reference, "secret is not valid UTF-8"))
    }

    /// Drop one cached entry so the next resolve refetches.
    pub async fn invalidate(&self, reference: &str) {
        self.cache.write().await.remove(reference);
    }

    /// Drop every cached secret.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    async fn fetch(&self, reference: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        match SecretLocation::classify(reference) {
            SecretLocation::Managed(name) => self.fetch_managed(reference, &name).await,
            SecretLocation::File(path) => tokio::fs::read(path)
                .await
                .map(Zeroizing::new)
                .map_err(|e| SecretError::unavailable(reference, e.kind().to_string())),
        }
    }

    async fn fetch_managed(
        &self,
        reference: &str,
        name: &str,
    ) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        let url = format!("{}/v1/{}:access", self.base_url, name);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SecretError::unavailable(reference, e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(reference = %reference, status = status.as_u16(), "managed secret fetch failed");
            return Err(SecretError::unavailable(
                reference,
                format!("secret service returned {}", status.as_u16()),
            ));
        }

        let body: AccessSecretResponse = response
            .json()
            .await
            .map_err(|_| SecretError::unavailable(reference, "unexpected response body"))?;

        general_purpose::STANDARD
            .decode(body.payload.data.as_bytes())
            .map(Zeroizing::new)
            .map_err(|_| SecretError::unavailable(reference, "payload is not base64"))
    }
}
