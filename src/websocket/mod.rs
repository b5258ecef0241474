//! WebSocket upgrade handling and HTTP routes, organized the way the
//! teacher splits this concern:
//!
//! - handler: upgrade entry point, path/query extraction, room-type parsing
//! - connection: the per-socket read/write loop
//! - routes: router assembly, CORS, `/metrics`

mod connection;
mod handler;
mod routes;

pub use routes::{create_router, metrics_handler};
