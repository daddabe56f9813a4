/*
 * Responsibility
 * - middleware entry points
 *   - auth::gate::apply (credential gate)
 *   - cors::apply, http::apply (cross-cutting, whole app)
 */
pub mod auth;
pub mod cors;
pub mod http;
