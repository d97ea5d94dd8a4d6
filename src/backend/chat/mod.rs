/**
 * Chat Module
 *
 * The conversation message router: the single operation that both the
 * socket path and the HTTP fallback path deliver into.
 */

pub mod router;

pub use router::{MessageRouter, SendOutcome, FALLBACK_REPLY};
