//! HTTP API: configuration, routing, and request/response mapping.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod jwt;
pub mod middleware;

pub use app::{AppServices, build_app, router};
pub use config::ApiConfig;
