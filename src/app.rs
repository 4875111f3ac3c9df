//! Application state: wires the query cache, remote client, filter state,
//! and edit session together and exposes the inbound actions the view layer
//! calls.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::cache::{QueryCache, QueryStatus};
use crate::listing::{self, ListFilter};
use crate::models::{User, UserDraft};
use crate::session::EditSession;

/// Cache key for the user list query
const USERS_QUERY_KEY: &str = "users";

/// Provisional ids start far above anything the demo service hands out,
/// so an optimistic row can never collide with a server-assigned id.
const PROVISIONAL_ID_BASE: i64 = 1_000_000_000;

/// Everything the view needs to render one frame: the derived rows, the
/// filter choices, and where the underlying query stands.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub rows: Vec<User>,
    pub company_choices: Vec<String>,
    pub status: QueryStatus,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct App {
    cache: QueryCache,
    api: ApiClient,
    filter: ListFilter,
    session: EditSession,
    /// Last mutation failure, for out-of-band surfacing (toast/log). The
    /// dialog has already closed by the time a submission settles.
    last_error: Option<String>,
    next_provisional_id: AtomicI64,
}

impl App {
    pub fn new(cache: QueryCache, api: ApiClient) -> Self {
        Self {
            cache,
            api,
            filter: ListFilter::new(),
            session: EditSession::new(),
            last_error: None,
            next_provisional_id: AtomicI64::new(PROVISIONAL_ID_BASE),
        }
    }

    // ===== Filter actions =====

    pub fn on_search_change(&mut self, text: impl Into<String>) {
        self.filter.search_text = text.into();
    }

    pub fn on_company_filter_change(&mut self, company: Option<String>) {
        self.filter.company = company;
    }

    pub fn on_sort_toggle(&mut self) {
        self.filter.sort_ascending = !self.filter.sort_ascending;
    }

    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    // ===== Edit session =====

    pub fn open_add(&mut self) {
        self.session.open_create();
    }

    pub fn open_edit(&mut self, user: User) {
        self.session.open_edit(user);
    }

    pub fn on_cancel(&mut self) {
        self.session.close();
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    // ===== Data flow =====

    /// Refresh the user list through the cache. Concurrent calls coalesce
    /// into a single network request.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let api = self.api.clone();
        self.cache
            .fetch(USERS_QUERY_KEY, move || async move { api.list_users().await })
            .await
    }

    /// Submit the dialog's draft.
    ///
    /// The optimistic append and the dialog close happen before the first
    /// await point, so the user sees the new row immediately; the network
    /// round-trip settles afterwards with a commit (reconciling the
    /// provisional id against the canonical record) or a rollback.
    ///
    /// Note the original tool's edit path behaves the same way: submission
    /// always creates, it never updates the target record. The edit target
    /// is only used to prefill the draft.
    pub async fn submit(&mut self, draft: UserDraft) -> Result<User, ApiError> {
        let api = self.api.clone();
        self.submit_with(draft, move |d| async move { api.create_user(&d).await })
            .await
    }

    /// Submission with an injected create operation. This is the seam the
    /// tests use; `submit` plugs in the real client.
    pub async fn submit_with<F, Fut>(&mut self, draft: UserDraft, create: F) -> Result<User, ApiError>
    where
        F: FnOnce(UserDraft) -> Fut,
        Fut: std::future::Future<Output = Result<User, ApiError>>,
    {
        let provisional_id = self.next_provisional_id.fetch_add(1, Ordering::Relaxed);
        let provisional = draft.clone().into_provisional(provisional_id);

        // Synchronous phase: patch the cache, close the dialog.
        let handle = self.cache.begin_append(USERS_QUERY_KEY, provisional);
        self.session.close();
        self.last_error = None;
        debug!(provisional_id, name = %draft.name, "Submitted draft, creation in flight");

        match create(draft).await {
            Ok(canonical) => {
                self.cache.commit(handle, Some(canonical.clone()));
                Ok(canonical)
            }
            Err(e) => {
                self.cache.rollback(handle);
                warn!(provisional_id, error = %e, "Creation failed, rolled back");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Failure message from the most recent submission, if it has not been
    /// surfaced yet.
    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    // ===== Read side =====

    /// Derive the current view from the cache and filter state.
    pub fn snapshot(&self) -> ViewSnapshot {
        let entry = self.cache.get(USERS_QUERY_KEY);
        let data: &[User] = entry.data.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        ViewSnapshot {
            rows: listing::derive(data, &self.filter),
            company_choices: listing::company_choices(data),
            status: entry.status,
            fetched_at: entry.fetched_at,
        }
    }

    /// Change signal; re-take [`App::snapshot`] on each tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
