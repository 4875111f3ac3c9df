//! userdeck - headless core for a small user-admin tool.
//!
//! Browses, filters, and creates user records against a public demo REST
//! endpoint. The interesting part is the optimistic list-mutation cache in
//! [`cache`]; [`listing`] derives the visible rows as a pure function and
//! [`app::App`] wires the pieces together behind the actions a view layer
//! calls.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod listing;
pub mod models;
pub mod session;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use app::{App, ViewSnapshot};
pub use cache::{QueryCache, QueryStatus};
pub use config::Config;
pub use listing::ListFilter;
pub use models::{Company, User, UserDraft};
pub use session::EditSession;
