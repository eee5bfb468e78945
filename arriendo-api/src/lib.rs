// Library entry point for tests and the binary

pub mod api_docs;
pub mod app;
pub mod audit_log;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod rbac;
pub mod routes;
pub mod setup;
pub mod version;

pub use app::AppState;
