/**
 * Routes Module
 *
 * Route configuration for the server: the WebSocket endpoint and the
 * authenticated HTTP API used as the fallback transport.
 */

pub mod api_routes;
pub mod router;

pub use router::create_router;
