//! HTTP API for the pizzaiolo server

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;

pub use auth::JwtAuth;
pub use middleware::AuthState;
pub use server::{ApiServer, ApiServerConfig};
