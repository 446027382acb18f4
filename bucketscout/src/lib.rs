pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod results;
pub mod search;
pub mod store;

pub use config::SearchConfig;
pub use errors::{SearchError, SearchResult, StoreError, StoreResult};
pub use results::{FetchFailure, MatchResult, SearchEvent, SearchSummary};
pub use search::{ensure_bucket, search, MatchStream, SearchQuery, SearchRequest, SearchState};
pub use store::{DirectoryStore, MemoryStore, ObjectContent, ObjectRef, ObjectStore};
