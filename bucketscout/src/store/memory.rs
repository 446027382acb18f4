//! In-memory object store.
//!
//! Used by the tests and benchmarks, and by callers that already hold the
//! objects they want to search. Fetch and listing failures can be injected to
//! exercise the engine's failure handling.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ObjectContent, ObjectRef, ObjectStore};
use crate::errors::{StoreError, StoreResult};

type Bucket = BTreeMap<String, Vec<u8>>;

/// Object store backed by a map of buckets
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    /// key -> message returned when fetching that key
    fetch_failures: RwLock<HashMap<String, String>>,
    /// message returned by every listing, when set
    list_failure: RwLock<Option<String>>,
}

// Every update is a single insert or assignment, so a poisoned map is still
// consistent and is used as is.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bucket, keeping it if it already exists
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        write(&self.buckets).entry(bucket.into()).or_default();
    }

    /// Stores an object, creating its bucket if needed
    pub fn put_object(&self, bucket: &str, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        write(&self.buckets)
            .entry(bucket.to_string())
            .or_default()
            .insert(key.into(), data.into());
    }

    /// Makes every fetch of `key` fail with `message`
    pub fn fail_fetch(&self, key: impl Into<String>, message: impl Into<String>) {
        write(&self.fetch_failures).insert(key.into(), message.into());
    }

    /// Makes every listing fail with `message`
    pub fn fail_listing(&self, message: impl Into<String>) {
        *write(&self.list_failure) = Some(message.into());
    }

    /// Number of objects stored in `bucket`
    pub fn object_count(&self, bucket: &str) -> usize {
        read(&self.buckets).get(bucket).map_or(0, BTreeMap::len)
    }
}

impl ObjectStore for MemoryStore {
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StoreResult<Vec<ObjectRef>> {
        if let Some(message) = read(&self.list_failure).as_ref() {
            return Err(StoreError::unavailable(message.clone()));
        }

        let buckets = read(&self.buckets);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::bucket_not_found(bucket))?;

        Ok(objects
            .keys()
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|key| ObjectRef::new(key.as_str()))
            .collect())
    }

    fn fetch_content(&self, bucket: &str, object: &ObjectRef) -> StoreResult<ObjectContent> {
        if object.key().is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if let Some(message) = read(&self.fetch_failures).get(object.key()) {
            return Err(StoreError::unavailable(message.clone()));
        }

        read(&self.buckets)
            .get(bucket)
            .ok_or_else(|| StoreError::bucket_not_found(bucket))?
            .get(object.key())
            .map(|data| ObjectContent::from(data.clone()))
            .ok_or_else(|| StoreError::object_not_found(bucket, object.key()))
    }

    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(read(&self.buckets).contains_key(bucket))
    }
}

/// Builder for memory stores with test data
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    store: MemoryStore,
}

impl MemoryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.store.create_bucket(bucket);
        self
    }

    pub fn with_object(
        self,
        bucket: &str,
        key: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.store.put_object(bucket, key, data);
        self
    }

    pub fn with_fetch_failure(self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.store.fail_fetch(key, message);
        self
    }

    pub fn with_list_failure(self, message: impl Into<String>) -> Self {
        self.store.fail_listing(message);
        self
    }

    pub fn build(self) -> MemoryStore {
        self.store
    }
}
