use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::User;

/// Where a cached query currently stands.
///
/// `Error` keeps the last good data; readers decide how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of a single cached query, as returned by [`QueryCache::get`].
///
/// `data` is an immutable list behind an `Arc`; every state transition swaps
/// the whole `Arc`, so a reader holding a snapshot never observes a torn or
/// partially applied list.
#[derive(Debug, Clone)]
pub struct QueryEntry {
    pub data: Option<Arc<Vec<User>>>,
    pub status: QueryStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Bumped whenever a new intent (fetch start or optimistic mutation)
    /// takes over the key. Stale fetch results and superseded mutation
    /// handles are detected by comparing against this.
    generation: u64,
}

impl Default for QueryEntry {
    fn default() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            fetched_at: None,
            generation: 0,
        }
    }
}

/// Explicit transaction object for one optimistic mutation.
///
/// Carries the pre-mutation snapshot and the generation it was issued under.
/// Settling a handle whose generation has been superseded is a no-op
/// (last writer wins).
#[derive(Debug)]
pub struct MutationHandle {
    key: String,
    data_before: Option<Arc<Vec<User>>>,
    status_before: QueryStatus,
    fetched_at_before: Option<DateTime<Utc>>,
    generation: u64,
    provisional_id: Option<i64>,
}

impl MutationHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The locally assigned id of the appended row, if this mutation was an
    /// append. Reconciliation on commit is keyed by this, never by content.
    pub fn provisional_id(&self) -> Option<i64> {
        self.provisional_id
    }
}

struct Inner {
    entries: Mutex<HashMap<String, QueryEntry>>,
    notify: watch::Sender<u64>,
}

/// Process-wide keyed cache of user-list query results.
///
/// Constructed once and passed by handle (`Clone` is cheap, all clones share
/// state). All synchronous operations complete without suspending; the only
/// await points are inside [`QueryCache::fetch`], which is what keeps reads
/// tear-free on a cooperative scheduler.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                notify,
            }),
        }
    }

    /// Current state of a key. Never blocks on the network; a key that has
    /// never been fetched reads as `Idle` with no data.
    pub fn get(&self, key: &str) -> QueryEntry {
        let entries = self.inner.entries.lock().expect("cache lock poisoned");
        entries.get(key).cloned().unwrap_or_default()
    }

    /// Subscribe to state-change notifications.
    ///
    /// The carried value is an opaque version counter; consumers re-read
    /// [`QueryCache::get`] (or re-derive their view) on each change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.notify.subscribe()
    }

    /// Fetch a key through `loader`, coalescing concurrent calls.
    ///
    /// If a fetch for `key` is already in flight the caller awaits its
    /// completion instead of invoking `loader`, so any number of concurrent
    /// callers produce exactly one network call. A follower returns `Ok(())`
    /// regardless of how the in-flight fetch settles; failures are recorded
    /// in the entry status and surface through `get`.
    ///
    /// A fetch that has been superseded by an optimistic mutation (or a newer
    /// fetch) discards its result on completion. Cancellation is cooperative;
    /// the transport call itself is not aborted.
    pub async fn fetch<F, Fut>(&self, key: &str, loader: F) -> Result<(), ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<User>, ApiError>>,
    {
        let generation = {
            let mut entries = self.inner.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.to_string()).or_default();
            if entry.status == QueryStatus::Loading {
                None
            } else {
                entry.status = QueryStatus::Loading;
                entry.generation += 1;
                Some(entry.generation)
            }
        };

        let Some(generation) = generation else {
            debug!(key, "Fetch already in flight, awaiting its result");
            return self.await_settled(key).await;
        };

        self.publish();
        let result = loader().await;

        {
            let mut entries = self.inner.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.to_string()).or_default();
            if entry.generation != generation {
                // A mutation or newer fetch took over the key while this
                // call was suspended; its result must not clobber theirs.
                debug!(key, generation, "Discarding superseded fetch result");
                return Ok(());
            }
            match result {
                Ok(users) => {
                    debug!(key, count = users.len(), "Fetch complete");
                    entry.data = Some(Arc::new(users));
                    entry.status = QueryStatus::Success;
                    entry.fetched_at = Some(Utc::now());
                }
                Err(e) => {
                    // Keep the last good data; readers see status=Error.
                    warn!(key, error = %e, "Fetch failed");
                    entry.status = QueryStatus::Error;
                    self.publish();
                    return Err(e);
                }
            }
        }

        self.publish();
        Ok(())
    }

    /// Begin an optimistic mutation: take over the key (cancelling any
    /// in-flight fetch's right to write), snapshot the current data, and
    /// replace it with `transform`'s output. Synchronous; never suspends.
    pub fn begin_mutation<F>(&self, key: &str, transform: F) -> MutationHandle
    where
        F: FnOnce(&[User]) -> Vec<User>,
    {
        let handle = {
            let mut entries = self.inner.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.to_string()).or_default();
            entry.generation += 1;

            // Never record Loading as the restore status. Starting a
            // mutation cancels the in-flight fetch's right to write, so if
            // this handle is rolled back no loader is running anymore;
            // restoring Loading would strand the key with followers waiting
            // on a fetch that never settles.
            let status_before = match entry.status {
                QueryStatus::Loading if entry.data.is_some() => QueryStatus::Success,
                QueryStatus::Loading => QueryStatus::Idle,
                other => other,
            };

            let handle = MutationHandle {
                key: key.to_string(),
                data_before: entry.data.take(),
                status_before,
                fetched_at_before: entry.fetched_at,
                generation: entry.generation,
                provisional_id: None,
            };

            let current: &[User] = handle.data_before.as_deref().map(Vec::as_slice).unwrap_or(&[]);
            entry.data = Some(Arc::new(transform(current)));
            entry.status = QueryStatus::Success;
            handle
        };

        debug!(key, generation = handle.generation, "Optimistic mutation started");
        self.publish();
        handle
    }

    /// Optimistically append `row`, recording its id as the provisional id
    /// for reconciliation on commit.
    pub fn begin_append(&self, key: &str, row: User) -> MutationHandle {
        let provisional_id = row.id;
        let mut handle = self.begin_mutation(key, |current| {
            let mut next = current.to_vec();
            next.push(row);
            next
        });
        handle.provisional_id = Some(provisional_id);
        handle
    }

    /// Settle a mutation as confirmed: the optimistic data becomes
    /// authoritative and the snapshot is dropped. If `canonical` is given,
    /// the provisional row recorded on the handle is replaced by it.
    ///
    /// No-op if a newer intent has superseded the handle.
    pub fn commit(&self, handle: MutationHandle, canonical: Option<User>) {
        {
            let mut entries = self.inner.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(handle.key.clone()).or_default();
            if entry.generation != handle.generation {
                debug!(key = %handle.key, "Commit on superseded mutation, ignoring");
                return;
            }

            if let (Some(provisional_id), Some(canonical)) = (handle.provisional_id, canonical) {
                let data = entry.data.as_deref().cloned().unwrap_or_default();
                let mut next = data;
                // The demo service hands out the same id for every create;
                // keep the provisional id rather than break id uniqueness.
                let id_taken = next
                    .iter()
                    .any(|u| u.id == canonical.id && u.id != provisional_id);
                if let Some(row) = next.iter_mut().find(|u| u.id == provisional_id) {
                    if id_taken {
                        warn!(
                            key = %handle.key,
                            canonical_id = canonical.id,
                            provisional_id,
                            "Canonical id already cached, keeping provisional id"
                        );
                        let keep_id = row.id;
                        *row = canonical;
                        row.id = keep_id;
                    } else {
                        *row = canonical;
                    }
                }
                entry.data = Some(Arc::new(next));
            }
        }

        debug!(key = %handle.key, "Mutation committed");
        self.publish();
    }

    /// Settle a mutation as failed: restore exactly the pre-mutation
    /// snapshot. No-op if a newer intent has superseded the handle.
    pub fn rollback(&self, handle: MutationHandle) {
        {
            let mut entries = self.inner.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(handle.key.clone()).or_default();
            if entry.generation != handle.generation {
                debug!(key = %handle.key, "Rollback on superseded mutation, ignoring");
                return;
            }
            entry.data = handle.data_before;
            entry.status = handle.status_before;
            entry.fetched_at = handle.fetched_at_before;
        }

        debug!(key = %handle.key, "Mutation rolled back");
        self.publish();
    }

    /// Wait until the in-flight fetch for `key` settles.
    async fn await_settled(&self, key: &str) -> Result<(), ApiError> {
        let mut rx = self.subscribe();
        loop {
            if self.get(key).status != QueryStatus::Loading {
                return Ok(());
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    fn publish(&self) {
        self.inner.notify.send_modify(|version| *version += 1);
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Company;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn user(id: i64, name: &str, email: &str, company: &str) -> User {
        User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            phone: "555-0100".to_string(),
            company: Company {
                name: company.to_string(),
            },
        }
    }

    fn seed() -> Vec<User> {
        vec![
            user(1, "Alice", "alice@acme.io", "Acme"),
            user(2, "Bob", "bob@beta.io", "Beta"),
        ]
    }

    #[test]
    fn test_get_before_any_fetch_is_idle() {
        let cache = QueryCache::new();
        let entry = cache.get("users");
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(entry.data.is_none());
        assert!(entry.fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_fetch_success_populates_entry() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        let entry = cache.get("users");
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.data.unwrap().len(), 2);
        assert!(entry.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_last_good_data() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        let result = cache
            .fetch("users", || async {
                Err(ApiError::Decode("bad shape".to_string()))
            })
            .await;
        assert!(result.is_err());

        let entry = cache.get("users");
        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_coalesce_to_one_call() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        let c2 = calls.clone();
        let (a, b) = tokio::join!(
            cache.fetch("users", move || async move {
                c1.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(seed())
            }),
            cache.fetch("users", move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }),
        );

        a.unwrap();
        b.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Both callers observe the leader's result
        assert_eq!(cache.get("users").data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mutation_supersedes_in_flight_fetch() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        // Start a slow refetch, then mutate before it lands
        let slow = cache.fetch("users", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![user(9, "Stale", "stale@old.io", "Old")])
        });

        let cache2 = cache.clone();
        let mutate = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache2.begin_append("users", user(1_000_000_001, "New", "new@acme.io", "Acme"))
        };

        let (fetch_result, handle) = tokio::join!(slow, mutate);
        fetch_result.unwrap();

        // The stale fetch result was discarded; the optimistic list stands
        let data = cache.get("users").data.unwrap();
        assert_eq!(data.len(), 3);
        assert!(data.iter().any(|u| u.id == 1_000_000_001));

        cache.commit(handle, None);
        assert_eq!(cache.get("users").data.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rollback_during_inflight_fetch_leaves_key_fetchable() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        // Mutate and roll back while a refetch is still in flight
        let slow = cache.fetch("users", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![user(9, "Stale", "stale@old.io", "Old")])
        });

        let cache2 = cache.clone();
        let mutate = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let handle =
                cache2.begin_append("users", user(1_000_000_001, "New", "new@acme.io", "Acme"));
            cache2.rollback(handle);
        };

        let (fetch_result, ()) = tokio::join!(slow, mutate);
        fetch_result.unwrap();

        // The key must not be stuck reporting a load that is no longer
        // running; rollback restored the pre-mutation data
        let entry = cache.get("users");
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.data.unwrap().len(), 2);

        // A later fetch takes the leader path and runs its loader instead
        // of waiting forever on a phantom in-flight fetch
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        cache
            .fetch("users", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(seed())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("users").status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn test_rollback_during_first_fetch_restores_idle() {
        let cache = QueryCache::new();

        let slow = cache.fetch("users", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(seed())
        });

        let cache2 = cache.clone();
        let mutate = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let handle =
                cache2.begin_append("users", user(1_000_000_001, "New", "new@acme.io", "Acme"));
            cache2.rollback(handle);
        };

        let (fetch_result, ()) = tokio::join!(slow, mutate);
        fetch_result.unwrap();

        // No data had ever landed, so the key reads as never fetched
        let entry = cache.get("users");
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(entry.data.is_none());
    }

    #[tokio::test]
    async fn test_rollback_restores_exact_snapshot() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();
        let before = cache.get("users").data.unwrap();

        let handle = cache.begin_append("users", user(1_000_000_001, "New", "n@x.io", "Acme"));
        assert_eq!(cache.get("users").data.unwrap().len(), 3);

        cache.rollback(handle);
        let after = cache.get("users").data.unwrap();
        assert_eq!(*after, *before);
        assert_eq!(cache.get("users").status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn test_rollback_on_never_fetched_key_restores_absence() {
        let cache = QueryCache::new();
        let handle = cache.begin_append("users", user(1_000_000_001, "New", "n@x.io", "Acme"));
        assert_eq!(cache.get("users").data.unwrap().len(), 1);

        cache.rollback(handle);
        let entry = cache.get("users");
        assert!(entry.data.is_none());
        assert_eq!(entry.status, QueryStatus::Idle);
    }

    #[tokio::test]
    async fn test_commit_reconciles_provisional_id() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        let handle = cache.begin_append("users", user(1_000_000_001, "New", "n@x.io", "Acme"));
        cache.commit(handle, Some(user(11, "New", "n@x.io", "Acme")));

        let data = cache.get("users").data.unwrap();
        assert_eq!(data.len(), 3);
        assert!(data.iter().any(|u| u.id == 11));
        assert!(!data.iter().any(|u| u.id == 1_000_000_001));
    }

    #[tokio::test]
    async fn test_commit_keeps_provisional_id_on_collision() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        // Service echoes an id that is already cached
        let handle = cache.begin_append("users", user(1_000_000_001, "New", "n@x.io", "Acme"));
        cache.commit(handle, Some(user(2, "New", "n@x.io", "Acme")));

        let data = cache.get("users").data.unwrap();
        assert_eq!(data.len(), 3);
        // Uniqueness preserved: provisional id kept, canonical fields applied
        let row = data.iter().find(|u| u.id == 1_000_000_001).unwrap();
        assert_eq!(row.name, "New");
        assert_eq!(data.iter().filter(|u| u.id == 2).count(), 1);
    }

    #[tokio::test]
    async fn test_superseded_mutation_settles_as_noop() {
        let cache = QueryCache::new();
        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        let first = cache.begin_append("users", user(1_000_000_001, "First", "f@x.io", "Acme"));
        let second = cache.begin_append("users", user(1_000_000_002, "Second", "s@x.io", "Acme"));

        // Last writer wins: the first handle's rollback must not undo the
        // second mutation
        cache.rollback(first);
        let data = cache.get("users").data.unwrap();
        assert_eq!(data.len(), 4);

        cache.commit(second, None);
        assert_eq!(cache.get("users").data.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_subscribe_sees_published_changes() {
        let cache = QueryCache::new();
        let mut rx = cache.subscribe();
        let seen = *rx.borrow_and_update();

        cache.fetch("users", || async { Ok(seed()) }).await.unwrap();

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update() > seen);
    }
}
