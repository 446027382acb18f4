//! Object store abstraction.
//!
//! The search engine never talks to storage directly. Everything it needs is
//! behind the [`ObjectStore`] trait: listing the keys of a bucket, fetching the
//! bytes of one object, and checking that a bucket exists. This keeps the
//! engine testable with [`MemoryStore`] and lets other backends plug in.
//!
//! Implementations must be `Send + Sync` because every worker in the pool
//! shares one store, and `fetch_content` must always return (success or
//! error) rather than block forever, since the coordinator waits for every
//! worker to finish.

pub mod directory;
pub mod memory;

use memmap2::Mmap;
use std::fmt;
use std::ops::Deref;

use crate::errors::StoreResult;

pub use directory::DirectoryStore;
pub use memory::{MemoryStore, MemoryStoreBuilder};

/// Operations the search engine needs from an object store.
pub trait ObjectStore: Send + Sync {
    /// Lists the objects of `bucket` in key order.
    ///
    /// `prefix` is a literal key prefix; `None` lists the whole bucket.
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StoreResult<Vec<ObjectRef>>;

    /// Fetches the full content of one object.
    fn fetch_content(&self, bucket: &str, object: &ObjectRef) -> StoreResult<ObjectContent>;

    /// Checks whether `bucket` exists and is reachable.
    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;
}

/// Identifies a stored object by its key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    key: String,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The key of the object within its bucket
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<&str> for ObjectRef {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ObjectRef {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Bytes of one fetched object, owned by the worker that fetched it
pub enum ObjectContent {
    Buffered(Vec<u8>),
    Mapped(Mmap),
}

impl ObjectContent {
    /// Number of bytes in the object
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Buffered(bytes) => bytes,
            Self::Mapped(map) => map,
        }
    }
}

impl Deref for ObjectContent {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for ObjectContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffered(bytes)
    }
}

impl fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Buffered(_) => "Buffered",
            Self::Mapped(_) => "Mapped",
        };
        f.debug_struct("ObjectContent")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
