/**
 * Server Module
 *
 * Configuration loading, shared application state, and app construction.
 */

pub mod config;
pub mod init;
pub mod state;

pub use config::ServerConfig;
pub use init::create_app;
pub use state::AppState;
