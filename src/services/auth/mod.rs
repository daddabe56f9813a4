pub mod claims;
pub mod context;
pub mod factory;
pub mod gate;
pub mod jwks;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use claims::Identity;
pub use context::AuthCtx;
pub use factory::build_credential_gate;
pub use gate::{CredentialGate, GateError, ROUTER_TOKEN_HEADER, Rejection, USER_TOKEN_HEADER};
pub use verifier::{TokenVerifier, VerifierError};
