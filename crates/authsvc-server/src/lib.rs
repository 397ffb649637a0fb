//! HTTP front end for the `authsvc-introspect` decision core.
//!
//! Serves `/health`, `/readyz` and `/introspect`, loads configuration from
//! TOML plus `AUTHSVC__*` environment overrides, and hot-reloads the JWKS
//! key file and logging level.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod watch;

pub use config::AppConfig;
pub use server::{AppState, AuthsvcServer, ServerBuilder, build_app};
