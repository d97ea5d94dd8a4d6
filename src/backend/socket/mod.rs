/**
 * Socket Module
 *
 * Server side of the persistent channel: the per-connection session
 * handler and the registry mapping identities and conversation rooms to
 * live sessions.
 */

pub mod registry;
pub mod session;

pub use registry::{SessionHandle, SessionRegistry};
pub use session::ws_handler;
