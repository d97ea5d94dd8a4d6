/**
 * Backend Error Module
 *
 * Error types for the server plus their conversion into HTTP responses.
 */

pub mod conversion;
pub mod types;

pub use types::BackendError;
