//! HTTP layer - REST routes over the session directory

pub mod routes;

pub use routes::build_router;
