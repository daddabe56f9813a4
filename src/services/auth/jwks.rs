//! JWKS-backed token verifier.
//!
//! Public keys are fetched from the configured key endpoint and cached.
//! Token checks (signature, exp/nbf, audience, issuer) are delegated to
//! `jsonwebtoken`; this module only picks the key and decides what counts
//! as "invalid token" versus "verifier failure".
//!
//! Fetches never run under the cache lock: requests holding a usable key
//! set keep verifying while a refresh is in flight. An expired set stays
//! in service when its refresh fails, and failed fetches are not retried
//! before `min_refresh_interval` has passed.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::claims::Identity;
use super::verifier::{TokenVerifier, VerifierError};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Verification policy knobs, kept apart from `Config` so the verifier
/// can be built in tests without environment variables.
#[derive(Debug, Clone)]
pub struct JwksSettings {
    pub endpoint: Url,
    // resource URN the tokens must be issued for (`aud`)
    pub audience: String,
    pub issuer: Option<String>,
    pub algorithms: Vec<Algorithm>,
    pub leeway_seconds: u64,
    pub cache_ttl: Duration,
    // floor between refreshes triggered by an unknown `kid`, and backoff after a failed fetch
    pub min_refresh_interval: Duration,
}

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

pub struct JwksVerifier {
    settings: JwksSettings,
    validation: Validation,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
    // Held for the duration of a fetch; records when the last fetch failed.
    refresh: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for JwksVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Cached key material stays out of logs
        f.debug_struct("JwksVerifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl JwksVerifier {
    pub fn new(settings: JwksSettings) -> Result<Self, VerifierError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[settings.audience.as_str()]);
        if let Some(issuer) = settings.issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }
        validation.leeway = settings.leeway_seconds;
        validation.validate_nbf = true;

        Ok(Self {
            settings,
            validation,
            http,
            cache: RwLock::new(None),
            refresh: Mutex::new(None),
        })
    }

    async fn cached(&self) -> Option<(Arc<JwkSet>, Instant)> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|cached| (cached.keys.clone(), cached.fetched_at))
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() < self.settings.cache_ttl
    }

    fn backing_off(&self, last_failure: Option<Instant>) -> bool {
        last_failure.is_some_and(|at| at.elapsed() < self.settings.min_refresh_interval)
    }

    async fn keys(&self) -> Result<Arc<JwkSet>, VerifierError> {
        let stale = match self.cached().await {
            Some((keys, fetched_at)) if self.is_fresh(fetched_at) => return Ok(keys),
            other => other.map(|(keys, _)| keys),
        };

        let Some(stale) = stale else {
            // Cold cache: nothing to serve, so wait for whichever fetch is running.
            let mut last_failure = self.refresh.lock().await;
            if let Some((keys, _)) = self.cached().await {
                return Ok(keys);
            }
            if self.backing_off(*last_failure) {
                return Err(VerifierError::Unavailable);
            }
            return self.refetch(&mut last_failure).await;
        };

        // Expired: one request refetches, the others keep the old set meanwhile.
        let Ok(mut last_failure) = self.refresh.try_lock() else {
            return Ok(stale);
        };
        if let Some((keys, fetched_at)) = self.cached().await {
            if self.is_fresh(fetched_at) {
                return Ok(keys);
            }
        }
        if self.backing_off(*last_failure) {
            return Ok(stale);
        }

        match self.refetch(&mut last_failure).await {
            Ok(keys) => Ok(keys),
            Err(e) => {
                warn!(error = %e, "key set refresh failed, serving the expired set");
                Ok(stale)
            }
        }
    }

    /// Re-fetch after a `kid` miss (key rotation).
    ///
    /// Returns `None` when the set in hand is too fresh to be worth refetching,
    /// or when the refetch failed.
    async fn refresh_after_miss(&self, seen: &Arc<JwkSet>) -> Option<Arc<JwkSet>> {
        let mut last_failure = self.refresh.lock().await;

        if let Some((keys, fetched_at)) = self.cached().await {
            if !Arc::ptr_eq(&keys, seen) {
                return Some(keys);
            }
            if fetched_at.elapsed() < self.settings.min_refresh_interval {
                return None;
            }
        }
        if self.backing_off(*last_failure) {
            return None;
        }

        match self.refetch(&mut last_failure).await {
            Ok(keys) => Some(keys),
            Err(e) => {
                warn!(error = %e, "key set refresh after unknown kid failed");
                None
            }
        }
    }

    // Caller holds the refresh lock; the cache lock is only taken for the swap.
    async fn refetch(
        &self,
        last_failure: &mut Option<Instant>,
    ) -> Result<Arc<JwkSet>, VerifierError> {
        match self.fetch().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                *self.cache.write().await = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                *last_failure = None;
                Ok(keys)
            }
            Err(e) => {
                *last_failure = Some(Instant::now());
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, VerifierError> {
        let endpoint = &self.settings.endpoint;
        debug!(%endpoint, "fetching key set");

        let resp = self.http.get(endpoint.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%endpoint, status = status.as_u16(), "key endpoint returned an error");
            return Err(VerifierError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        let keys: JwkSet = serde_json::from_slice(&body)
            .map_err(|e| VerifierError::InvalidKeySet(e.to_string()))?;
        if keys.keys.is_empty() {
            return Err(VerifierError::InvalidKeySet("key set is empty".into()));
        }

        info!(%endpoint, keys = keys.keys.len(), "key set refreshed");
        Ok(keys)
    }

    fn decode(&self, token: &str, alg: Algorithm, jwk: &Jwk) -> Option<Identity> {
        if let Some(key_alg) = &jwk.common.key_algorithm {
            if Algorithm::from_str(&key_alg.to_string()).ok() != Some(alg) {
                debug!(token_alg = ?alg, key_alg = %key_alg, "token algorithm does not match the key");
                return None;
            }
        }

        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "unusable jwk");
                return None;
            }
        };

        let mut validation = self.validation.clone();
        validation.algorithms = vec![alg];

        match jsonwebtoken::decode::<Identity>(token, &key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "token rejected");
                None
            }
        }
    }
}

fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        // Without a kid the choice is only unambiguous for a single-key set.
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Option<Identity>, VerifierError> {
        let header = match jsonwebtoken::decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                debug!(error = %e, "malformed token");
                return Ok(None);
            }
        };

        if !self.settings.algorithms.contains(&header.alg) {
            debug!(alg = ?header.alg, "token algorithm not allowed");
            return Ok(None);
        }

        let kid = header.kid.as_deref();
        let keys = self.keys().await?;

        if let Some(jwk) = select_key(&keys, kid) {
            return Ok(self.decode(token, header.alg, jwk));
        }

        let Some(refreshed) = self.refresh_after_miss(&keys).await else {
            debug!(?kid, "no key matches token");
            return Ok(None);
        };

        match select_key(&refreshed, kid) {
            Some(jwk) => Ok(self.decode(token, header.alg, jwk)),
            None => {
                debug!(?kid, "no key matches token after refresh");
                Ok(None)
            }
        }
    }
}
