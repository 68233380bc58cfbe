// API module
//
// The HTTP boundary over the ledger: typed request/response structs,
// handlers, and the route registration table

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use routes::configure_routes;
