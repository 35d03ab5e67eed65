//! Optimistic, self-healing query cache in front of a storage driver.
//!
//! A [`LiveCache`] answers every query immediately from its last known result
//! and refreshes that result from the store in the background. Local writes go
//! through [`LiveCache::set`], which merges the new document into every cached
//! result before the store has confirmed it. Each entry's follower, by
//! contrast, only ever merges into the entry it was created for.
//!
//! # Conflict policy
//!
//! Background refreshes replace a whole entry at once. When refreshes race,
//! the one that finishes last wins. A refresh that fails, for example because
//! the store closed underneath it, leaves the entry untouched.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use vellum_core::{
    compare::sort_and_limit,
    document::{AuthorKeypair, DocToSet, IngestResult, IngestResultAndDoc, LocalIndex, SharedDoc},
    driver::StorageDriver,
    error::{DocumentStoreError, DocumentStoreResult},
    evaluator::doc_matches_filter,
    query::{Cursor, Filter, HistoryMode, OrderBy, Query, WillMatch, clean_up_query},
    validator::FormatValidator,
};

use crate::follower::{FollowerCallback, QueryFollower};

/// Default time before a cached result is refreshed and re-announced on read.
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_millis(1000);

/// Fire-and-forget observer of cache changes.
pub type CacheObserver = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct CacheEntry {
    query: Query,
    docs: Vec<SharedDoc>,
    follower: Arc<QueryFollower>,
    /// `None` never expires.
    expires: Option<Instant>,
}

impl CacheEntry {
    fn with_docs(&self, docs: Vec<SharedDoc>, expires: Option<Instant>) -> Self {
        Self {
            query: self.query.clone(),
            docs,
            follower: self.follower.clone(),
            expires,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| Instant::now() > at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Replace the docs, keep the expiry, tell nobody.
    Quiet,
    /// Replace the docs, restart the expiry window and notify observers.
    Announced,
}

struct CacheShared {
    driver: Arc<dyn StorageDriver>,
    validator: Arc<dyn FormatValidator>,
    time_to_live: Duration,
    runtime: Handle,
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    observers: Mutex<BTreeMap<u64, CacheObserver>>,
    next_observer_id: AtomicU64,
}

impl CacheShared {
    /// End of a fresh expiry window, or `None` when it lies past what
    /// [`Instant`] can represent.
    fn expiry(&self) -> Option<Instant> {
        Instant::now().checked_add(self.time_to_live)
    }

    fn notify(&self) {
        let observers: Vec<CacheObserver> = self.observers.lock().values().cloned().collect();
        for observer in observers {
            self.runtime.spawn(observer());
        }
    }

    /// Applies [`optimistic_merge`] to the entry under `key`, notifying if it changed.
    fn merge_into(&self, key: &str, doc: &SharedDoc) {
        let changed = {
            let mut entries = self.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => match optimistic_merge(&entry.query, &entry.docs, doc) {
                    Some(docs) => {
                        *entry = Arc::new(entry.with_docs(docs, entry.expires));
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };

        if changed {
            debug!(%key, path = %doc.path, author = %doc.author, "follower merge");
            self.notify();
        }
    }

    /// Applies [`optimistic_merge`] to every entry, notifying once if anything changed.
    fn merge_everywhere(&self, doc: &SharedDoc) {
        let mut changed = false;
        {
            let mut entries = self.entries.lock();
            for entry in entries.values_mut() {
                if let Some(docs) = optimistic_merge(&entry.query, &entry.docs, doc) {
                    *entry = Arc::new(entry.with_docs(docs, entry.expires));
                    changed = true;
                }
            }
        }

        if changed {
            debug!(path = %doc.path, author = %doc.author, "optimistic merge");
            self.notify();
        }
    }

    fn spawn_refresh(self: &Arc<Self>, key: String, query: Query, refresh: Refresh) {
        let shared = self.clone();
        self.runtime.spawn(async move {
            let docs = match shared.driver.query_docs(&query).await {
                Ok(docs) => docs,
                Err(err) => {
                    debug!(%key, %err, "discarding failed cache refresh");
                    return;
                }
            };

            {
                let mut entries = shared.entries.lock();
                let Some(current) = entries.get(&key) else {
                    return;
                };
                let expires = match refresh {
                    Refresh::Quiet => current.expires,
                    Refresh::Announced => shared.expiry(),
                };
                let next = Arc::new(current.with_docs(docs, expires));
                entries.insert(key.clone(), next);
            }

            if refresh == Refresh::Announced {
                debug!(%key, "cache entry refreshed");
                shared.notify();
            }
        });
    }
}

/// A query cache that answers immediately and heals itself in the background.
///
/// Reads never wait on the store. The first read of a query returns an empty
/// result and starts populating it; later reads return the last known result
/// and schedule a refresh. Each cached query also has a [`QueryFollower`] that
/// merges newly stored documents into the cache as they arrive.
///
/// # Example
///
/// ```ignore
/// use vellum_cache::LiveCache;
///
/// let cache = LiveCache::builder(driver, validator).build()?;
/// let _unsubscribe = cache.on_cache_updated(|| async { println!("cache changed") });
///
/// assert!(cache.query_docs(&query)?.is_empty());
/// // ...once the background population finishes:
/// let docs = cache.query_docs(&query)?;
/// ```
#[derive(Clone)]
pub struct LiveCache {
    shared: Arc<CacheShared>,
}

impl fmt::Debug for LiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCache")
            .field("driver", &self.shared.driver)
            .field("time_to_live", &self.shared.time_to_live)
            .field("cached_queries", &self.cached_query_count())
            .finish()
    }
}

impl LiveCache {
    /// Creates a builder for a cache in front of `driver`.
    pub fn builder<D>(driver: Arc<D>, validator: Arc<dyn FormatValidator>) -> LiveCacheBuilder
    where
        D: StorageDriver + 'static,
    {
        LiveCacheBuilder::new(driver, validator)
    }

    pub fn driver(&self) -> &Arc<dyn StorageDriver> {
        &self.shared.driver
    }

    pub fn time_to_live(&self) -> Duration {
        self.shared.time_to_live
    }

    /// Number of distinct queries currently cached.
    pub fn cached_query_count(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Returns the cached result for `query`, possibly stale or empty.
    ///
    /// # Arguments
    ///
    /// * `query` - The query to answer; equal queries share one cache entry
    ///
    /// # Returns
    ///
    /// The current snapshot. A background refresh is scheduled every time;
    /// when the entry has expired a second refresh also restarts the expiry
    /// window and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`] for a malformed query.
    pub fn query_docs(&self, query: &Query) -> DocumentStoreResult<Vec<SharedDoc>> {
        let cleaned = clean_up_query(query)?;
        if cleaned.will_match == WillMatch::Nothing {
            return Ok(vec![]);
        }
        let query = cleaned.query;
        let key = query.canonical_key()?;

        let existing = self.shared.entries.lock().get(&key).cloned();
        if let Some(entry) = existing {
            debug!(%key, "cache hit");
            self.shared
                .spawn_refresh(key.clone(), entry.query.clone(), Refresh::Quiet);
            if entry.is_expired() {
                debug!(%key, "cache entry expired");
                self.shared
                    .spawn_refresh(key, entry.query.clone(), Refresh::Announced);
            }
            return Ok(entry.docs.clone());
        }

        debug!(%key, "cache miss");
        // The initial refresh covers everything up to here.
        let seen = *self.shared.driver.watch_local_index().borrow();
        let follower = Arc::new(QueryFollower::with_callback(
            self.shared.driver.clone(),
            follower_query(&query, seen),
            self.follower_callback(key.clone()),
        )?);

        {
            let mut entries = self.shared.entries.lock();
            if let Some(raced) = entries.get(&key) {
                // Another caller created it while the lock was released.
                return Ok(raced.docs.clone());
            }
            entries.insert(
                key.clone(),
                Arc::new(CacheEntry {
                    query: query.clone(),
                    docs: vec![],
                    follower: follower.clone(),
                    expires: self.shared.expiry(),
                }),
            );
        }

        follower.hatch();
        self.shared.spawn_refresh(key, query, Refresh::Announced);

        Ok(vec![])
    }

    /// Every version of every document, path descending.
    pub fn get_all_docs(&self) -> DocumentStoreResult<Vec<SharedDoc>> {
        self.ensure_store_open()?;
        self.query_docs(
            &Query::builder()
                .history_mode(HistoryMode::All)
                .order_by(OrderBy::PathDesc)
                .build(),
        )
    }

    /// The latest version at each path, path descending.
    pub fn get_latest_docs(&self) -> DocumentStoreResult<Vec<SharedDoc>> {
        self.ensure_store_open()?;
        self.query_docs(
            &Query::builder()
                .history_mode(HistoryMode::Latest)
                .order_by(OrderBy::PathDesc)
                .build(),
        )
    }

    /// Every version at `path`.
    pub fn get_all_docs_at_path(&self, path: &str) -> DocumentStoreResult<Vec<SharedDoc>> {
        self.ensure_store_open()?;
        self.query_docs(
            &Query::builder()
                .history_mode(HistoryMode::All)
                .order_by(OrderBy::PathDesc)
                .filter(Filter::new().path(path))
                .build(),
        )
    }

    /// The latest version at `path`, if the cache knows of one.
    pub fn get_latest_doc_at_path(&self, path: &str) -> DocumentStoreResult<Option<SharedDoc>> {
        self.ensure_store_open()?;
        let docs = self.query_docs(
            &Query::builder()
                .history_mode(HistoryMode::Latest)
                .order_by(OrderBy::PathDesc)
                .filter(Filter::new().path(path))
                .build(),
        )?;
        Ok(docs.into_iter().next())
    }

    /// Writes a document optimistically.
    ///
    /// The document is built and signed locally, merged into every cached
    /// result right away, and handed to the store in the background. The
    /// outcome is reported as accepted and latest without waiting for the store.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotReady`] when the store is closing or
    /// closed, and [`DocumentStoreError::Validation`] when signing fails.
    pub fn set(&self, keypair: &AuthorKeypair, doc_to_set: &DocToSet) -> DocumentStoreResult<IngestResultAndDoc> {
        self.ensure_store_open()?;

        let doc: SharedDoc = Arc::new(self.shared.validator.generate_document(
            keypair,
            self.shared.driver.workspace(),
            doc_to_set,
        )?);
        debug!(path = %doc.path, author = %doc.author, "set");

        self.shared.merge_everywhere(&doc);

        let driver = self.shared.driver.clone();
        let pending = Arc::clone(&doc);
        self.shared.runtime.spawn(async move {
            if let Err(err) = driver.upsert((*pending).clone()).await {
                warn!(path = %pending.path, %err, "background write failed");
            }
        });

        Ok(IngestResultAndDoc {
            ingest_result: IngestResult::AcceptedAndLatest,
            doc_ingested: Some(doc),
        })
    }

    /// Registers an observer fired whenever any cache entry changes.
    ///
    /// Observers run in the background; several observers fire in no
    /// particular order.
    pub fn on_cache_updated<F, Fut>(&self, observer: F) -> Unsubscribe
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let observer: CacheObserver = Arc::new(move || observer().boxed());
        let id = self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.shared.observers.lock().insert(id, observer);

        Unsubscribe {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    fn ensure_store_open(&self) -> DocumentStoreResult<()> {
        if self.shared.driver.is_closed() {
            Err(DocumentStoreError::NotReady)
        } else {
            Ok(())
        }
    }

    /// Feeds one entry's follower deliveries back into that entry only.
    fn follower_callback(&self, key: String) -> FollowerCallback {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |doc: SharedDoc| {
            if let Some(shared) = shared.upgrade() {
                shared.merge_into(&key, &doc);
            }
            async {}.boxed()
        })
    }
}

/// Handle returned by [`LiveCache::on_cache_updated`].
#[derive(Debug)]
pub struct Unsubscribe {
    shared: Weak<CacheShared>,
    id: u64,
}

impl Unsubscribe {
    /// Removes exactly the observer this handle was returned for.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.observers.lock().remove(&self.id);
        }
    }
}

/// Builder for [`LiveCache`].
pub struct LiveCacheBuilder {
    driver: Arc<dyn StorageDriver>,
    validator: Arc<dyn FormatValidator>,
    time_to_live: Duration,
}

impl LiveCacheBuilder {
    pub fn new<D>(driver: Arc<D>, validator: Arc<dyn FormatValidator>) -> Self
    where
        D: StorageDriver + 'static,
    {
        Self {
            driver,
            validator,
            time_to_live: DEFAULT_TIME_TO_LIVE,
        }
    }

    /// Sets how long a cached result stays fresh.
    pub fn time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Builds the cache on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] outside a runtime.
    pub fn build(self) -> DocumentStoreResult<LiveCache> {
        let runtime = Handle::try_current()
            .map_err(|err| DocumentStoreError::Initialization(err.to_string()))?;

        Ok(LiveCache {
            shared: Arc::new(CacheShared {
                driver: self.driver,
                validator: self.validator,
                time_to_live: self.time_to_live,
                runtime,
                entries: Mutex::new(HashMap::new()),
                observers: Mutex::new(BTreeMap::new()),
                next_observer_id: AtomicU64::new(0),
            }),
        })
    }
}

/// The shape a cache entry's follower listens with, resuming after `seen`.
fn follower_query(query: &Query, seen: Option<LocalIndex>) -> Query {
    Query {
        history_mode: Some(HistoryMode::All),
        order_by: Some(OrderBy::LocalIndexAsc),
        start_after: seen.map(Cursor::local_index),
        filter: query.filter.clone(),
        ..Query::default()
    }
}

/// Merges one incoming document into one cached result.
///
/// Returns the new result, or `None` when the entry is unaffected. No
/// timestamps are compared: a local write is assumed to be the newest, and the
/// next background refresh restores the store's ordering.
fn optimistic_merge(query: &Query, docs: &[SharedDoc], doc: &SharedDoc) -> Option<Vec<SharedDoc>> {
    let append = || {
        let mut next = docs.to_vec();
        next.push(doc.clone());
        next
    };
    let replace_where = |matches: &dyn Fn(&SharedDoc) -> bool| {
        docs.iter()
            .map(|existing| {
                if matches(existing) {
                    doc.clone()
                } else {
                    existing.clone()
                }
            })
            .collect::<Vec<_>>()
    };

    let Some(same_path) = docs.iter().find(|existing| existing.path == doc.path) else {
        // Cursors are not checked here; the next refresh corrects the slice.
        if query
            .filter
            .as_ref()
            .is_some_and(|filter| !doc_matches_filter(doc, filter))
        {
            return None;
        }
        return Some(sort_and_limit(append(), query));
    };

    let next = match query.history_mode_or_default() {
        HistoryMode::All => {
            let same_author =
                |existing: &SharedDoc| existing.path == doc.path && existing.author == doc.author;
            match docs.iter().find(|existing| same_author(*existing)) {
                Some(existing) if **existing == **doc => return None,
                Some(_) => replace_where(&same_author),
                None => append(),
            }
        }
        HistoryMode::Latest => {
            if same_path.author == doc.author && **same_path == **doc {
                return None;
            }
            replace_where(&|existing: &SharedDoc| existing.path == doc.path)
        }
    };

    Some(sort_and_limit(next, query))
}
