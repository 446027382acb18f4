//! The concurrent search engine.
//!
//! A search runs in five steps:
//!
//! 1. **Listing**: the store lists the bucket, narrowed by the key filter.
//! 2. **Partitioning**: the object list is cut into at most `parallelism`
//!    contiguous chunks ([`partition()`]).
//! 3. **Dispatching**: one worker per chunk is spawned on a rayon pool of
//!    `parallelism` threads.
//! 4. **Scanning**: each worker fetches its objects one at a time, splits them
//!    into lines ([`QueryMatcher::scan`]) and sends every matching line, with
//!    a bounded [`excerpt()`], to the caller as soon as it is found.
//! 5. **Collecting**: the caller iterates a [`MatchStream`], which blocks on a
//!    single channel and ends once every worker has signalled completion.
//!
//! ```rust,ignore
//! let store = Arc::new(DirectoryStore::new("/mnt/buckets"));
//! let request = SearchRequest::new("logs", "connection reset").ignore_case(true);
//! for m in search(store, &request)?.matches() {
//!     println!("{} {}:{}", m.key, m.line_number, m.excerpt_lossy());
//! }
//! ```
pub mod engine;
pub mod excerpt;
pub mod matcher;
pub mod partition;

pub use engine::{ensure_bucket, search, MatchStream, SearchQuery, SearchRequest, SearchState};
pub use excerpt::{excerpt, MAX_EXCERPT_LENGTH};
pub use matcher::{case_aware_contains, LineMatch, QueryMatcher};
pub use partition::{default_parallelism, partition};
