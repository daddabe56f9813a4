/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Hand the per-request AuthCtx (set by the gate middleware) to handlers
 *
 * Public API:
 * - AuthCtx
 * - AuthCtxExtractor
 */

mod core;

pub use crate::services::auth::AuthCtx;
pub use core::AuthCtxExtractor;
