//! Sitegate account service: configuration, logging and the route table
//! around `sitegate-auth`.

pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{SitegateServer, build_app, build_state};
