//! Middleware components for the HTTP surface.

pub mod request_id;

pub use request_id::{request_id_layers, request_span, REQUEST_ID_HEADER};
