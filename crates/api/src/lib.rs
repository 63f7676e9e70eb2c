//! HTTP API: credential extraction, routing, and error-to-status mapping.

pub mod app;
pub mod context;
pub mod middleware;
