//! Typed HTTP client for the Encore Tasks API.

pub mod api;
pub mod config;
pub mod error;
pub mod requests;

pub use api::ApiClient;
pub use config::{ClientConfig, RetryPolicy};
pub use error::ClientError;
