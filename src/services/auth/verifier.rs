//! Token verification capability used by the credential gate.
use async_trait::async_trait;
use thiserror::Error;

use super::claims::Identity;

/// Failures of the verification collaborator itself.
///
/// An invalid token is NOT an error: `verify` returns `Ok(None)` for that.
/// These variants mean the verifier could not reach a verdict at all.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("key endpoint request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("key endpoint returned status {0}")]
    Status(u16),
    #[error("invalid key set: {0}")]
    InvalidKeySet(String),
    #[error("key endpoint unavailable, next fetch deferred")]
    Unavailable,
}

/// Validates an opaque token and resolves it to an identity.
///
/// Shared by both token kinds. For the router token only the presence of
/// the returned identity matters.
///
/// Implementations must be cheap to share (`Arc<dyn TokenVerifier>`) and
/// safe to call from many requests at once.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    // Returns:
    // - Ok(Some(identity)) => token verified
    // - Ok(None)           => token invalid (bad signature, expired, unknown key, ...)
    // - Err(_)             => verifier failure, surfaced as an internal error
    async fn verify(&self, token: &str) -> Result<Option<Identity>, VerifierError>;
}
