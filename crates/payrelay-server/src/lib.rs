pub mod gateway;
pub mod routes;
pub mod server;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
