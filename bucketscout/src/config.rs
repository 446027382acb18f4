use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SearchError, SearchResult};
use crate::search::{default_parallelism, SearchQuery, SearchRequest};

/// Configuration for a search.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.bucketscout.yaml` in the current directory
/// 3. Global `$HOME/.config/bucketscout/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Directory whose subdirectories are buckets
/// store_root: "/mnt/buckets"
///
/// # Bucket to search
/// bucket: "logs"
///
/// # Key prefix, literal or a regular expression anchored at the key start
/// prefix: "app/2024-0[1-3]"
///
/// # Compare ASCII letters case-insensitively
/// ignore_case: true
///
/// # Concurrent workers (default: CPU cores - 1, at least 1)
/// parallelism: 4
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Command-line arguments take precedence over file values, see
/// [`SearchConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Substring to search for
    #[serde(default)]
    pub query: String,

    /// Bucket to search
    #[serde(default)]
    pub bucket: String,

    /// Optional key prefix
    #[serde(default)]
    pub prefix: Option<String>,

    /// Whether to ignore ASCII case
    #[serde(default)]
    pub ignore_case: bool,

    /// Root directory of the directory-backed store
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Number of concurrent workers; CPU cores - 1 when unset
    #[serde(default)]
    pub parallelism: Option<NonZeroUsize>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_store_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            bucket: String::new(),
            prefix: None,
            ignore_case: false,
            store_root: default_store_root(),
            parallelism: None,
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file,
    /// which must exist
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Global, then local; later sources override earlier ones
        let default_files = [
            dirs::config_dir().map(|p| p.join("bucketscout/config.yaml")),
            Some(PathBuf::from(".bucketscout.yaml")),
        ];
        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: SearchConfig) -> Self {
        // CLI values take precedence over config file values
        if !cli_config.query.is_empty() {
            self.query = cli_config.query;
        }
        if !cli_config.bucket.is_empty() {
            self.bucket = cli_config.bucket;
        }
        if cli_config.prefix.is_some() {
            self.prefix = cli_config.prefix;
        }
        if cli_config.ignore_case {
            self.ignore_case = true;
        }
        if cli_config.store_root != default_store_root() {
            self.store_root = cli_config.store_root;
        }
        if cli_config.parallelism.is_some() {
            self.parallelism = cli_config.parallelism;
        }
        if cli_config.log_level != default_log_level() {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// Validates the configuration and turns it into a search request.
    /// An empty query is allowed and matches every line.
    pub fn request(&self) -> SearchResult<SearchRequest> {
        if self.bucket.trim().is_empty() {
            return Err(SearchError::config_error("a bucket name is required"));
        }
        Ok(SearchRequest {
            bucket: self.bucket.trim().to_string(),
            prefix: self.prefix.clone(),
            query: SearchQuery {
                text: self.query.clone(),
                ignore_case: self.ignore_case,
            },
            parallelism: self.parallelism.unwrap_or_else(default_parallelism),
        })
    }
}
