//! In-memory query cache with optimistic mutation support.
//!
//! This module provides the `QueryCache`: a keyed map from query name to the
//! last-known result list, its status, and a change signal. Writes go through
//! an explicit transaction protocol (`begin_mutation` / `commit` /
//! `rollback`) so an optimistic local change can be applied before the remote
//! service confirms it and undone exactly if it does not.

pub mod store;

pub use store::{MutationHandle, QueryCache, QueryEntry, QueryStatus};
