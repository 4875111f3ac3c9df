//! REST client module for the remote user-directory service.
//!
//! This module provides the `ApiClient` for listing and creating user
//! records. Responses are decoded into typed models at this boundary;
//! shapes that do not parse fail with `ApiError::Decode` rather than
//! propagating unchecked data inward.
//!
//! No retries are performed here; retry policy, if any, belongs to callers.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
