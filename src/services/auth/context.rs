/*
 * Responsibility
 * - Per-request authentication result handed to handlers
 * - Built once by the credential gate, read-only afterwards
 *
 * Notes
 * - `identity == None` is a valid state (routed but anonymous request).
 *   A missing user token and a user token that failed verification both
 *   end up here; only the server log tells them apart.
 */
use super::claims::Identity;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthCtx {
    identity: Option<Identity>,
}

impl AuthCtx {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.identity.as_ref().and_then(Identity::subject)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
