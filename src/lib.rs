//! Real-time delivery for a support-chat application.
//!
//! The crate is split into three areas:
//!
//! - [`shared`] holds the wire types used by both halves (messages,
//!   conversations, socket protocol events, shared error types).
//! - [`backend`] is the axum server: WebSocket sessions, the session
//!   registry, the conversation message router, and the HTTP fallback
//!   routes.
//! - [`client`] is the client half: a reconnecting transport session,
//!   the in-memory conversation state, and the dual-path send coordinator
//!   that falls back to HTTP when the socket is unavailable.

pub mod backend;
pub mod client;
pub mod shared;
