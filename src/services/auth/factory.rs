/// Factory: build the credential gate and its verifier from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::auth::{
    CredentialGate, TokenVerifier, VerifierError,
    jwks::{JwksSettings, JwksVerifier},
};

pub fn build_verifier(config: &Config) -> Result<Arc<dyn TokenVerifier>, VerifierError> {
    let verifier = JwksVerifier::new(JwksSettings {
        endpoint: config.public_key_endpoint.clone(),
        audience: config.resource_urn.clone(),
        issuer: config.auth_issuer.clone(),
        algorithms: config.allowed_algorithms.clone(),
        leeway_seconds: config.token_leeway_seconds,
        cache_ttl: Duration::from_secs(config.jwks_cache_ttl_seconds),
        min_refresh_interval: Duration::from_secs(config.jwks_min_refresh_seconds),
    })?;

    Ok(Arc::new(verifier))
}

pub fn build_credential_gate(config: &Config) -> Result<CredentialGate, VerifierError> {
    Ok(CredentialGate::new(build_verifier(config)?))
}
