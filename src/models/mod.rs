//! Data models for user-admin entities.
//!
//! The `User` shape mirrors the remote service's wire format; decoding is
//! strict about the fields this crate relies on and ignores the rest.

pub mod user;

pub use user::{Company, User, UserDraft};
