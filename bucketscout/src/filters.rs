/// Key filtering for object listings.
///
/// The prefix a user passes on the command line is interpreted the same way
/// everywhere:
///
/// 1. Surrounding whitespace is removed, then leading and trailing `/`.
/// 2. An empty result means "the whole bucket".
/// 3. A prefix without regular-expression metacharacters is a plain key
///    prefix, which the store can apply while listing.
/// 4. Anything else is compiled as `^<prefix>` and matched against each
///    listed key, so `logs/2024-0[1-3]` selects the first quarter.
///
/// ```rust,ignore
/// let filter = KeyFilter::parse(Some(" /logs/ "))?;
/// assert_eq!(filter.listing_prefix(), Some("logs"));
/// ```
use regex::Regex;
use tracing::debug;

use crate::errors::{SearchError, SearchResult};
use crate::store::ObjectRef;

const REGEX_METACHARACTERS: &[char] = &[
    '*', '+', '?', '[', ']', '(', ')', '{', '}', '|', '^', '$', '.', '\\',
];

/// Which keys of a bucket take part in a search
#[derive(Debug, Clone, Default)]
pub enum KeyFilter {
    #[default]
    All,
    Prefix(String),
    Pattern(Regex),
}

impl KeyFilter {
    /// Builds a filter from an optional user-supplied prefix
    pub fn parse(prefix: Option<&str>) -> SearchResult<Self> {
        let Some(raw) = prefix else {
            return Ok(Self::All);
        };

        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::All);
        }

        if !trimmed.contains(REGEX_METACHARACTERS) {
            debug!("Using literal key prefix '{}'", trimmed);
            return Ok(Self::Prefix(trimmed.to_string()));
        }

        debug!("Compiling key prefix expression '{}'", trimmed);
        Regex::new(&format!("^{}", trimmed))
            .map(Self::Pattern)
            .map_err(|e| SearchError::invalid_prefix(trimmed, e))
    }

    /// The prefix the store can apply while listing, if any
    pub fn listing_prefix(&self) -> Option<&str> {
        match self {
            Self::Prefix(prefix) => Some(prefix),
            Self::All | Self::Pattern(_) => None,
        }
    }

    /// Checks if a key passes this filter
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Pattern(regex) => regex.is_match(key),
        }
    }

    /// Drops the listed objects that do not pass this filter
    pub fn apply(&self, objects: Vec<ObjectRef>) -> Vec<ObjectRef> {
        match self {
            Self::All => objects,
            _ => objects
                .into_iter()
                .filter(|object| self.matches(object.key()))
                .collect(),
        }
    }
}
