//! Shared building blocks for the column sync service.
//!
//! - [`config`]: environment-driven application and connection configuration
//! - [`errors`]: the error taxonomy used by every layer
//! - [`response`]: the unified API response envelope
//! - [`middleware`]: request tracing middleware
//! - [`models`]: connection, selection and catalog models
//! - [`utils`]: SQL helpers

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
