//! Deterministic `TokenVerifier` double for unit tests.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::claims::Identity;
use super::verifier::{TokenVerifier, VerifierError};

/// Answers from a fixed token table and records every call in order.
///
/// Tokens that are not in the table are invalid. Tokens listed in
/// `failing` make the verifier itself fail.
#[derive(Debug, Default)]
pub struct RecordingVerifier {
    valid: HashMap<String, Identity>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl RecordingVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(mut self, token: &str, identity: Identity) -> Self {
        self.valid.insert(token.to_string(), identity);
        self
    }

    pub fn fail_on(mut self, token: &str) -> Self {
        self.failing.push(token.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenVerifier for RecordingVerifier {
    async fn verify(&self, token: &str) -> Result<Option<Identity>, VerifierError> {
        self.calls.lock().unwrap().push(token.to_string());

        if self.failing.iter().any(|t| t == token) {
            return Err(VerifierError::Status(503));
        }
        Ok(self.valid.get(token).cloned())
    }
}
