use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::matcher::QueryMatcher;
use super::partition::{default_parallelism, partition};
use crate::errors::{SearchError, SearchResult};
use crate::filters::KeyFilter;
use crate::metrics::SearchMetrics;
use crate::results::{FetchFailure, MatchResult, SearchEvent, SearchSummary};
use crate::store::{ObjectRef, ObjectStore};

/// Results each worker may have in flight before it waits for the consumer
const RESULTS_PER_WORKER: usize = 64;

/// Lifecycle of a search.
///
/// `Listing` and `Dispatching` happen inside [`search`]; a failure there moves
/// to `Aborted` and is returned as an error. The remaining states belong to
/// the [`MatchStream`] the caller iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Listing,
    Dispatching,
    Collecting,
    Draining,
    Done,
    Aborted,
}

/// The text to look for and how to compare it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub ignore_case: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ignore_case: false,
        }
    }
}

/// Everything one search needs besides the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub query: SearchQuery,
    /// Upper bound on concurrent workers
    pub parallelism: NonZeroUsize,
}

impl SearchRequest {
    pub fn new(bucket: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            query: SearchQuery::new(query),
            parallelism: default_parallelism(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.query.ignore_case = ignore_case;
        self
    }

    pub fn with_parallelism(mut self, parallelism: NonZeroUsize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Messages from workers to the stream. One channel carries all three kinds,
/// so a single blocking receive observes results and completion alike.
enum WorkerEvent {
    Matched(MatchResult),
    FetchFailed(FetchFailure),
    Done { worker: usize },
}

/// Checks that `bucket` exists before searching it
pub fn ensure_bucket(store: &dyn ObjectStore, bucket: &str) -> SearchResult<()> {
    match store.bucket_exists(bucket) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SearchError::bucket_not_found(bucket)),
        Err(source) => Err(SearchError::validation(bucket, source)),
    }
}

/// Starts a search and returns the stream of its results.
///
/// Listing happens before this returns, so a listing failure is reported here
/// and nothing is dispatched. After that the search cannot fail: objects that
/// cannot be fetched show up as [`SearchEvent::FetchFailed`] and the remaining
/// objects are still scanned. An empty query matches every line.
pub fn search(store: Arc<dyn ObjectStore>, request: &SearchRequest) -> SearchResult<MatchStream> {
    let started = Instant::now();
    let filter = KeyFilter::parse(request.prefix.as_deref())?;

    info!(
        "Starting search for {:?} in bucket {} (ignore case: {})",
        request.query.text, request.bucket, request.query.ignore_case
    );

    let mut state = SearchState::Listing;
    debug!("Search state: {:?}", state);
    let objects = match store.list_objects(&request.bucket, filter.listing_prefix()) {
        Ok(objects) => filter.apply(objects),
        Err(source) => {
            advance(&mut state, SearchState::Aborted);
            error!("Listing bucket {} failed: {}", request.bucket, source);
            return Err(SearchError::list_failed(&request.bucket, source));
        }
    };
    debug!("Listed {} objects in {}", objects.len(), request.bucket);

    advance(&mut state, SearchState::Dispatching);
    let pool = match build_pool(request.parallelism) {
        Ok(pool) => pool,
        Err(e) => {
            advance(&mut state, SearchState::Aborted);
            return Err(e);
        }
    };

    let partitions = partition(&objects, request.parallelism);
    debug!(
        "Dispatching {} workers for {} objects (parallelism {})",
        partitions.len(),
        objects.len(),
        request.parallelism
    );

    let matcher = Arc::new(QueryMatcher::new(
        request.query.text.as_bytes(),
        request.query.ignore_case,
    ));
    let metrics = SearchMetrics::new();
    let bucket: Arc<str> = Arc::from(request.bucket.as_str());
    let cancelled = Arc::new(AtomicBool::new(false));
    let (events, receiver) = mpsc::sync_channel(channel_capacity(request.parallelism));

    for (id, chunk) in partitions.iter().enumerate() {
        let worker = Worker {
            id,
            bucket: Arc::clone(&bucket),
            objects: chunk.to_vec(),
            store: Arc::clone(&store),
            matcher: Arc::clone(&matcher),
            metrics: metrics.clone(),
            events: events.clone(),
            cancelled: Arc::clone(&cancelled),
        };
        pool.spawn(move || worker.run());
    }
    drop(events);

    advance(&mut state, SearchState::Collecting);
    Ok(MatchStream {
        bucket: request.bucket.clone(),
        receiver,
        workers: partitions.len(),
        completed: 0,
        objects_listed: objects.len(),
        state,
        metrics,
        started,
        cancelled,
        _pool: pool,
    })
}

fn advance(state: &mut SearchState, next: SearchState) {
    debug!("Search state: {:?} -> {:?}", state, next);
    *state = next;
}

fn channel_capacity(parallelism: NonZeroUsize) -> usize {
    parallelism.get().saturating_mul(RESULTS_PER_WORKER)
}

fn build_pool(parallelism: NonZeroUsize) -> SearchResult<ThreadPool> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(parallelism.get())
        .thread_name(|i| format!("bucketscout-worker-{}", i))
        .panic_handler(|_| error!("A search worker panicked; its remaining objects are skipped"))
        .build()?;
    Ok(pool)
}

/// Scans one partition. Dropping a worker sends its completion signal, so
/// every dispatched worker signals exactly once, even if it panics.
struct Worker {
    id: usize,
    bucket: Arc<str>,
    objects: Vec<ObjectRef>,
    store: Arc<dyn ObjectStore>,
    matcher: Arc<QueryMatcher>,
    metrics: SearchMetrics,
    events: SyncSender<WorkerEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        trace!("Worker {} scanning {} objects", self.id, self.objects.len());
        for object in &self.objects {
            if self.cancelled.load(Ordering::Relaxed) || !self.scan_object(object) {
                debug!("Search stream dropped, worker {} stopping", self.id);
                return;
            }
        }
        trace!("Worker {} finished", self.id);
    }

    /// Returns false once nobody is listening anymore
    fn scan_object(&self, object: &ObjectRef) -> bool {
        let content = match self.store.fetch_content(&self.bucket, object) {
            Ok(content) => content,
            Err(error) => {
                debug!("Failed to fetch {}/{}: {}", self.bucket, object, error);
                self.metrics.record_fetch_failure();
                return self.send(WorkerEvent::FetchFailed(FetchFailure {
                    key: object.key().to_string(),
                    error,
                }));
            }
        };

        trace!("Scanning {} ({} bytes)", object, content.len());
        self.metrics.record_object(content.len() as u64);
        if content.is_empty() {
            return true;
        }

        for line in self.matcher.scan(&content) {
            self.metrics.record_match();
            let result = MatchResult {
                key: object.key().to_string(),
                line_number: line.line_number,
                excerpt: line.excerpt.to_vec(),
            };
            if !self.send(WorkerEvent::Matched(result)) {
                return false;
            }
        }
        true
    }

    fn send(&self, event: WorkerEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // The stream may already be gone; there is nobody left to tell then.
        let _ = self.events.send(WorkerEvent::Done { worker: self.id });
    }
}

/// Results of a running search, in arrival order.
///
/// Each call to `next` blocks until a worker reports a match or a fetch
/// failure, and ends the stream once every worker has signalled completion.
/// Results of one object arrive in line order; results of different objects
/// interleave freely.
///
/// The result channel holds a bounded number of events per worker. A worker
/// that gets ahead of the consumer waits at its next send. Dropping the
/// stream early stops every worker before its next object, and a worker
/// blocked on a send stops right away.
pub struct MatchStream {
    bucket: String,
    receiver: Receiver<WorkerEvent>,
    workers: usize,
    completed: usize,
    objects_listed: usize,
    state: SearchState,
    metrics: SearchMetrics,
    started: Instant,
    cancelled: Arc<AtomicBool>,
    _pool: ThreadPool,
}

impl MatchStream {
    /// The bucket being searched
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Number of workers dispatched
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of workers that have signalled completion so far
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Statistics so far; final once the stream has ended
    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            objects_listed: self.objects_listed,
            objects_scanned: self.metrics.objects_scanned(),
            bytes_scanned: self.metrics.bytes_scanned(),
            fetch_failures: self.metrics.fetch_failures(),
            matches: self.metrics.matches(),
            workers: self.workers,
            elapsed: self.started.elapsed(),
        }
    }

    /// Only the matches of this search. Fetch failures are logged as warnings.
    pub fn matches(self) -> impl Iterator<Item = MatchResult> {
        self.filter_map(|event| match event {
            SearchEvent::Match(result) => Some(result),
            SearchEvent::FetchFailed(failure) => {
                warn!("Skipped {}", failure);
                None
            }
        })
    }

    fn finish(&mut self) {
        if self.state == SearchState::Done {
            return;
        }
        advance(&mut self.state, SearchState::Draining);
        if self.completed < self.workers {
            warn!(
                "Result channel closed after {} of {} workers completed",
                self.completed, self.workers
            );
        }
        advance(&mut self.state, SearchState::Done);

        self.metrics.log_stats();
        info!("Search of {} complete. {}", self.bucket, self.summary());
    }
}

impl Drop for MatchStream {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Iterator for MatchStream {
    type Item = SearchEvent;

    fn next(&mut self) -> Option<SearchEvent> {
        while self.completed < self.workers {
            match self.receiver.recv() {
                Ok(WorkerEvent::Matched(result)) => return Some(SearchEvent::Match(result)),
                Ok(WorkerEvent::FetchFailed(failure)) => {
                    return Some(SearchEvent::FetchFailed(failure))
                }
                Ok(WorkerEvent::Done { worker }) => {
                    self.completed += 1;
                    trace!(
                        "Worker {} done ({}/{})",
                        worker,
                        self.completed,
                        self.workers
                    );
                }
                Err(_) => break,
            }
        }
        self.finish();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{StoreError, StoreResult};
    use crate::store::{MemoryStore, MemoryStoreBuilder, ObjectContent};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn n(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).unwrap()
    }

    fn dessert_store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStoreBuilder::new()
                .with_object(
                    "bucket",
                    "key0",
                    "Apple pie\nBlueberrycheescake\nCarrot cake\n",
                )
                .with_object("bucket", "key1", "Donut\nEclair\n")
                .with_object("bucket", "key2", "")
                .with_object("bucket", "key3", "Strawberry shortcake\n")
                .with_fetch_failure("key3", "access denied")
                .build(),
        )
    }

    #[test]
    fn test_single_match_with_failing_object() {
        for parallelism in 1..6 {
            let request = SearchRequest::new("bucket", "berry").with_parallelism(n(parallelism));
            let stream = search(dessert_store(), &request).unwrap();

            let mut matches = Vec::new();
            let mut failures = Vec::new();
            let mut stream = stream;
            for event in stream.by_ref() {
                match event {
                    SearchEvent::Match(m) => matches.push(m),
                    SearchEvent::FetchFailed(f) => failures.push(f),
                }
            }

            assert_eq!(matches.len(), 1, "parallelism {}", parallelism);
            assert_eq!(matches[0].key, "key0");
            assert_eq!(matches[0].line_number, 2);
            assert_eq!(matches[0].excerpt, b"Blueberrycheescake");

            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].key, "key3");

            assert_eq!(stream.state(), SearchState::Done);
            assert_eq!(stream.completed(), stream.workers());
            let summary = stream.summary();
            assert_eq!(summary.objects_listed, 4);
            assert_eq!(summary.objects_scanned, 3);
            assert_eq!(summary.fetch_failures, 1);
            assert_eq!(summary.matches, 1);
        }
    }

    #[test]
    fn test_ignore_case() {
        let request = SearchRequest::new("bucket", "BERRY")
            .ignore_case(true)
            .with_parallelism(n(2));
        let keys: Vec<String> = search(dessert_store(), &request)
            .unwrap()
            .matches()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["key0".to_string()]);

        let request = SearchRequest::new("bucket", "BERRY").with_parallelism(n(2));
        assert_eq!(search(dessert_store(), &request).unwrap().matches().count(), 0);
    }

    #[test]
    fn test_listing_failure_aborts() {
        let store = Arc::new(
            MemoryStoreBuilder::new()
                .with_object("bucket", "key0", "berry")
                .with_list_failure("expired credentials")
                .build(),
        );
        let result = search(store, &SearchRequest::new("bucket", "berry"));
        match result {
            Err(SearchError::ListFailed { bucket, source }) => {
                assert_eq!(bucket, "bucket");
                assert!(matches!(source, StoreError::Unavailable(_)));
            }
            other => panic!("expected a listing failure, got {:?}", other.map(|s| s.state())),
        }
    }

    #[test]
    fn test_missing_bucket_is_a_listing_failure() {
        let store = Arc::new(MemoryStore::new());
        let result = search(store, &SearchRequest::new("nope", "x"));
        assert!(matches!(result, Err(SearchError::ListFailed { .. })));
    }

    #[test]
    fn test_empty_query_matches_every_line() {
        let store = Arc::new(
            MemoryStoreBuilder::new()
                .with_object("bucket", "a", "one\ntwo\n")
                .with_object("bucket", "b", "single")
                .with_object("bucket", "c", "")
                .build(),
        );
        for ignore_case in [false, true] {
            let request = SearchRequest::new("bucket", "")
                .ignore_case(ignore_case)
                .with_parallelism(n(2));
            let mut lines: Vec<(String, usize, Vec<u8>)> = search(store.clone(), &request)
                .unwrap()
                .matches()
                .map(|m| (m.key, m.line_number, m.excerpt))
                .collect();
            lines.sort();
            assert_eq!(
                lines,
                vec![
                    ("a".to_string(), 1, b"one".to_vec()),
                    ("a".to_string(), 2, b"two".to_vec()),
                    ("a".to_string(), 3, Vec::new()),
                    ("b".to_string(), 1, b"single".to_vec()),
                ]
            );
        }
    }

    #[test]
    fn test_empty_bucket_terminates_immediately() {
        let store = Arc::new(MemoryStoreBuilder::new().with_bucket("bucket").build());
        let mut stream = search(store, &SearchRequest::new("bucket", "x")).unwrap();
        assert_eq!(stream.workers(), 0);
        assert!(stream.next().is_none());
        assert_eq!(stream.state(), SearchState::Done);
    }

    #[test]
    fn test_terminates_for_any_mix_of_failures() {
        let store = MemoryStore::new();
        for i in 0..37 {
            store.put_object("bucket", format!("obj{:02}", i), format!("line\nneedle {}\n", i));
            if i % 3 == 0 {
                store.fail_fetch(format!("obj{:02}", i), "boom");
            }
        }
        let store = Arc::new(store);

        for parallelism in [1, 2, 3, 7, 16, 64] {
            let request = SearchRequest::new("bucket", "needle").with_parallelism(n(parallelism));
            let mut stream = search(store.clone(), &request).unwrap();
            assert!(stream.workers() <= parallelism);

            let mut matched = HashSet::new();
            let mut failed = HashSet::new();
            for event in stream.by_ref() {
                match event {
                    SearchEvent::Match(m) => {
                        assert_eq!(m.line_number, 2);
                        assert!(matched.insert(m.key));
                    }
                    SearchEvent::FetchFailed(f) => {
                        assert!(failed.insert(f.key));
                    }
                }
            }
            assert_eq!(failed.len(), 13);
            assert_eq!(matched.len(), 24);
            assert!(matched.is_disjoint(&failed));
            assert_eq!(stream.completed(), stream.workers());
        }
    }

    #[test]
    fn test_results_ordered_within_object() {
        let content: String = (0..500).map(|i| format!("row {} needle\n", i)).collect();
        let store = Arc::new(
            MemoryStoreBuilder::new()
                .with_object("bucket", "a", content.clone())
                .with_object("bucket", "b", content)
                .build(),
        );
        let request = SearchRequest::new("bucket", "needle").with_parallelism(n(2));
        let mut last_line = std::collections::HashMap::new();
        for m in search(store, &request).unwrap().matches() {
            let previous = last_line.insert(m.key.clone(), m.line_number).unwrap_or(0);
            assert!(m.line_number > previous);
        }
        assert_eq!(last_line.get("a"), Some(&500));
        assert_eq!(last_line.get("b"), Some(&500));
    }

    #[test]
    fn test_prefix_filters() {
        let store = Arc::new(
            MemoryStoreBuilder::new()
                .with_object("bucket", "logs/2024-01.log", "needle")
                .with_object("bucket", "logs/2024-05.log", "needle")
                .with_object("bucket", "data/2024-01.log", "needle")
                .build(),
        );

        let request = SearchRequest::new("bucket", "needle").with_prefix("/logs/");
        let mut keys: Vec<String> = search(store.clone(), &request)
            .unwrap()
            .matches()
            .map(|m| m.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["logs/2024-01.log", "logs/2024-05.log"]);

        let request = SearchRequest::new("bucket", "needle").with_prefix("logs/2024-0[1-3]");
        let keys: Vec<String> = search(store.clone(), &request)
            .unwrap()
            .matches()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["logs/2024-01.log"]);

        let request = SearchRequest::new("bucket", "needle").with_prefix("logs/(");
        assert!(matches!(
            search(store, &request),
            Err(SearchError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn test_dropping_stream_early() {
        let content: String = (0..2000).map(|i| format!("needle {}\n", i)).collect();
        let store = MemoryStore::new();
        for i in 0..8 {
            store.put_object("bucket", format!("obj{}", i), content.clone());
        }
        let request = SearchRequest::new("bucket", "needle").with_parallelism(n(4));
        let mut stream = search(Arc::new(store), &request).unwrap();
        assert!(stream.next().is_some());
        drop(stream);
    }

    #[test]
    fn test_workers_wait_for_slow_consumer() {
        let content: String = (0..5000).map(|i| format!("needle {}\n", i)).collect();
        let store = MemoryStore::new();
        for i in 0..8 {
            store.put_object("bucket", format!("obj{}", i), content.clone());
        }
        let parallelism = n(4);
        let request = SearchRequest::new("bucket", "needle").with_parallelism(parallelism);
        let mut stream = search(Arc::new(store), &request).unwrap();

        thread::sleep(Duration::from_millis(300));
        // A match is counted before it is sent, so each blocked worker holds one more.
        let in_flight = channel_capacity(parallelism) + stream.workers();
        assert!(stream.summary().matches <= in_flight as u64);

        assert_eq!(stream.by_ref().count(), 8 * 5000);
        assert_eq!(stream.summary().matches, 8 * 5000);
    }

    /// Counts fetches and takes a while to answer each one
    struct SlowStore {
        inner: MemoryStore,
        fetches: AtomicUsize,
    }

    impl ObjectStore for SlowStore {
        fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StoreResult<Vec<ObjectRef>> {
            self.inner.list_objects(bucket, prefix)
        }

        fn fetch_content(&self, bucket: &str, object: &ObjectRef) -> StoreResult<ObjectContent> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.inner.fetch_content(bucket, object)
        }

        fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
            self.inner.bucket_exists(bucket)
        }
    }

    #[test]
    fn test_dropped_stream_stops_fetching() {
        let inner = MemoryStore::new();
        inner.put_object("bucket", "obj00", "needle");
        for i in 1..50 {
            inner.put_object("bucket", format!("obj{:02}", i), "hay");
        }
        let store = Arc::new(SlowStore {
            inner,
            fetches: AtomicUsize::new(0),
        });
        let request = SearchRequest::new("bucket", "needle").with_parallelism(n(1));

        let mut stream = search(store.clone(), &request).unwrap();
        let first = stream.next().and_then(SearchEvent::into_match).unwrap();
        assert_eq!(first.key, "obj00");
        drop(stream);

        thread::sleep(Duration::from_millis(200));
        let fetched = store.fetches.load(Ordering::SeqCst);
        assert!(fetched < 10, "fetched {} objects after the stream was dropped", fetched);
    }

    struct PanickingStore {
        inner: MemoryStore,
    }

    impl ObjectStore for PanickingStore {
        fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StoreResult<Vec<ObjectRef>> {
            self.inner.list_objects(bucket, prefix)
        }

        fn fetch_content(&self, bucket: &str, object: &ObjectRef) -> StoreResult<ObjectContent> {
            if object.key() == "poison" {
                panic!("store bug");
            }
            self.inner.fetch_content(bucket, object)
        }

        fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
            self.inner.bucket_exists(bucket)
        }
    }

    #[test]
    fn test_panicking_worker_still_completes() {
        let inner = MemoryStoreBuilder::new()
            .with_object("bucket", "a", "needle")
            .with_object("bucket", "poison", "needle")
            .with_object("bucket", "z", "needle")
            .build();
        let store = Arc::new(PanickingStore { inner });
        let request = SearchRequest::new("bucket", "needle").with_parallelism(n(3));

        let mut stream = search(store, &request).unwrap();
        let keys: HashSet<String> = stream
            .by_ref()
            .filter_map(SearchEvent::into_match)
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, HashSet::from(["a".to_string(), "z".to_string()]));
        assert_eq!(stream.state(), SearchState::Done);
        assert_eq!(stream.completed(), 3);
    }

    #[test]
    fn test_ensure_bucket() {
        let store = MemoryStoreBuilder::new().with_bucket("bucket").build();
        assert!(ensure_bucket(&store, "bucket").is_ok());
        assert!(matches!(
            ensure_bucket(&store, "other"),
            Err(SearchError::BucketNotFound(_))
        ));
    }
}
