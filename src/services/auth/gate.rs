//! Two-tier credential gate.
//!
//! Every request must present a router token that verifies; a user token is
//! optional and only ever downgrades the request to anonymous when it is
//! missing or invalid.
//!
//! The gate knows nothing about HTTP. The middleware in
//! `middleware::auth::gate` extracts the two header values and calls
//! [`CredentialGate::authenticate`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::context::AuthCtx;
use super::verifier::{TokenVerifier, VerifierError};

/// Header carrying the mandatory inter-service routing token.
pub const ROUTER_TOKEN_HEADER: &str = "x-sdd-router-token";
/// Header carrying the optional end-user token.
pub const USER_TOKEN_HEADER: &str = "x-sdd-user-token";

/// Machine-readable code attached to every rejection.
pub const UNAUTHENTICATED_CODE: &str = "UNAUTHENTICATED";

/// Why a request was turned away. Both cases map to 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("router token is not present")]
    MissingRouterToken,
    #[error("router token cannot be verified")]
    InvalidRouterToken,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        UNAUTHENTICATED_CODE
    }

    pub fn http_status(&self) -> u16 {
        401
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("token verifier failed: {0}")]
    Verifier(#[from] VerifierError),
}

#[derive(Clone)]
pub struct CredentialGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate").finish_non_exhaustive()
    }
}

impl CredentialGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Decide whether a request may proceed, and as whom.
    ///
    /// Order is fixed: the router token is checked (presence, then
    /// verification) before the user token is even looked at.
    ///
    /// # Errors
    ///
    /// - `GateError::Rejected` when the router token is missing or does not verify
    /// - `GateError::Verifier` when the verifier could not reach a verdict
    ///
    /// A missing or invalid user token is never an error.
    pub async fn authenticate(
        &self,
        router_token: Option<&str>,
        user_token: Option<&str>,
    ) -> Result<AuthCtx, GateError> {
        let router_token = present(router_token).ok_or(Rejection::MissingRouterToken)?;

        if self.verifier.verify(router_token).await?.is_none() {
            warn!("router token verification failed");
            return Err(Rejection::InvalidRouterToken.into());
        }

        let Some(user_token) = present(user_token) else {
            warn!("user token is not present");
            return Ok(AuthCtx::anonymous());
        };

        match self.verifier.verify(user_token).await? {
            Some(identity) => {
                debug!(sub = ?identity.subject(), "user token verified");
                Ok(AuthCtx::authenticated(identity))
            }
            None => {
                warn!("user token cannot be validated");
                Ok(AuthCtx::anonymous())
            }
        }
    }
}

// Empty header values count as absent.
fn present(token: Option<&str>) -> Option<&str> {
    token.filter(|t| !t.is_empty())
}
