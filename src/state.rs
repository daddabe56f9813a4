/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 *   - gate: credential gate (holds the token verifier)
 *   - executor: where verified queries are handed off
 * - Cheap to clone (Arc inside)
 */
use std::sync::Arc;

use crate::services::{auth::CredentialGate, query::QueryExecutor};

#[derive(Clone)]
pub struct AppState {
    pub gate: CredentialGate,
    pub executor: Arc<dyn QueryExecutor>,
}

impl AppState {
    pub fn new(gate: CredentialGate, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { gate, executor }
    }
}
