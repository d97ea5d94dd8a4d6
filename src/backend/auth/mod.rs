/**
 * Authentication Capability Check
 *
 * Credential issuance lives elsewhere; this module only answers "is this
 * caller authenticated, and who are they" by verifying JWT bearer tokens.
 */

pub mod sessions;

pub use sessions::{create_token, verify_token, Claims};
