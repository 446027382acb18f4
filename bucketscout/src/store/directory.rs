//! Directory-backed object store.
//!
//! Every subdirectory of the root is a bucket, and every regular file below a
//! bucket is an object whose key is its `/`-separated path relative to the
//! bucket directory. This makes a synced or mounted copy of a bucket
//! searchable with the same engine.

use ignore::WalkBuilder;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};

use super::{ObjectContent, ObjectRef, ObjectStore};
use crate::errors::{StoreError, StoreResult};

/// Objects at least this large are memory mapped instead of read
pub(crate) const LARGE_OBJECT_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        if !is_plain_name(bucket) {
            return Err(StoreError::bucket_not_found(bucket));
        }
        let dir = self.root.join(bucket);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::bucket_not_found(bucket))
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::object_not_found(bucket, key));
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }
}

/// A bucket name must be a single normal path component
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Converts a path below the bucket directory into an object key
fn key_for(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl ObjectStore for DirectoryStore {
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> StoreResult<Vec<ObjectRef>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        debug!("Listing objects under {}", bucket_dir.display());

        let mut builder = WalkBuilder::new(&bucket_dir);
        builder
            .hidden(false)
            .standard_filters(false)
            .follow_links(false);

        let mut objects = Vec::new();
        for entry in builder.build() {
            let entry = entry.map_err(|e| {
                StoreError::unavailable(format!("walking {}: {}", bucket_dir.display(), e))
            })?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(key) = key_for(&bucket_dir, entry.path()) else {
                warn!("Skipping non UTF-8 object path {}", entry.path().display());
                continue;
            };
            if prefix.map_or(true, |p| key.starts_with(p)) {
                trace!("Listed object {}", key);
                objects.push(ObjectRef::new(key));
            }
        }

        objects.sort_unstable();
        Ok(objects)
    }

    fn fetch_content(&self, bucket: &str, object: &ObjectRef) -> StoreResult<ObjectContent> {
        let key = object.key();
        let path = self.object_path(bucket, key)?;
        let map_err = |e: std::io::Error| match e.kind() {
            ErrorKind::NotFound => StoreError::object_not_found(bucket, key),
            _ => StoreError::io(key, e),
        };

        let file = File::open(&path).map_err(map_err)?;
        let size = file.metadata().map_err(map_err)?.len();

        if size >= LARGE_OBJECT_THRESHOLD {
            trace!("Memory mapping {} ({} bytes)", key, size);
            // The mapping is read-only and dropped as soon as the object is scanned.
            let map = unsafe { Mmap::map(&file) }.map_err(map_err)?;
            Ok(ObjectContent::Mapped(map))
        } else {
            let bytes = fs::read(&path).map_err(map_err)?;
            Ok(ObjectContent::Buffered(bytes))
        }
    }

    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        if !is_plain_name(bucket) {
            return Ok(false);
        }
        match fs::metadata(self.root.join(bucket)) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(bucket, e)),
        }
    }
}
