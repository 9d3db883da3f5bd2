//! Application bootstrap helpers for axum services.
//!
//! - [`builder::AppBuilder`]: registers CORS, method override, body parsing, request id,
//!   security headers, SSL enforcement and controllers in caller order.
//! - [`services::security::SecurityMiddlewareFactory`]: security headers from a partial
//!   configuration merged onto defaults.

pub mod app;
pub mod builder;
pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod services;

pub use builder::AppBuilder;
pub use error::AppError;
