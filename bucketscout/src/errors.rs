/// Error types for bucketscout.
///
/// Two layers of errors exist, mirroring the two layers of the crate:
///
/// 1. [`StoreError`] is produced by an [`ObjectStore`](crate::store::ObjectStore)
///    implementation. When it happens while fetching a single object it is a
///    *local* failure: the worker reports it and moves on to the next object.
///
/// 2. [`SearchError`] is what the caller of [`search`](crate::search::search)
///    sees. Only pre-flight validation and listing can produce one; once the
///    workers are dispatched the search always runs to completion.
///
/// ```rust,ignore
/// match search(store, &request) {
///     Ok(stream) => for event in stream { /* render */ },
///     Err(SearchError::ListFailed { bucket, source }) => // nothing to scan,
///     Err(e) => // invalid request,
/// }
/// ```
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by an object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },
    #[error("Object has no key")]
    EmptyKey,
    #[error("IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn bucket_not_found(bucket: impl Into<String>) -> Self {
        Self::BucketNotFound {
            bucket: bucket.into(),
        }
    }

    pub fn object_not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Errors that can occur before or while starting a search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("The provided prefix `{prefix}` is not a valid regular expression: {source}")]
    InvalidPrefix {
        prefix: String,
        #[source]
        source: regex::Error,
    },
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Could not validate bucket {bucket}: {source}")]
    Validation {
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("Failed to list objects in {bucket}: {source}")]
    ListFailed {
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn invalid_prefix(prefix: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
            source,
        }
    }

    pub fn bucket_not_found(bucket: impl Into<String>) -> Self {
        Self::BucketNotFound(bucket.into())
    }

    pub fn validation(bucket: impl Into<String>, source: StoreError) -> Self {
        Self::Validation {
            bucket: bucket.into(),
            source,
        }
    }

    pub fn list_failed(bucket: impl Into<String>, source: StoreError) -> Self {
        Self::ListFailed {
            bucket: bucket.into(),
            source,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether this error happened after validation, while listing objects
    pub fn is_list_failure(&self) -> bool {
        matches!(self, Self::ListFailed { .. })
    }
}
