/// Search result types.
///
/// Every value here is owned. A [`MatchResult`] is built by exactly one
/// worker, moved through the result channel, and handed to the caller, so no
/// two results ever share storage and nothing needs to be locked.
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::errors::StoreError;

/// A single matching line of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Key of the object the line belongs to
    pub key: String,
    /// 1-based line number within the object
    pub line_number: usize,
    /// Bounded excerpt of the line around the match
    pub excerpt: Vec<u8>,
}

impl MatchResult {
    /// The excerpt decoded as UTF-8, with invalid sequences replaced
    pub fn excerpt_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.excerpt)
    }
}

/// An object whose content could not be fetched
#[derive(Debug)]
pub struct FetchFailure {
    pub key: String,
    pub error: StoreError,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.error, self.key)
    }
}

/// An item of a search stream
#[derive(Debug)]
pub enum SearchEvent {
    Match(MatchResult),
    FetchFailed(FetchFailure),
}

impl SearchEvent {
    /// Returns the match, if this event is one
    pub fn into_match(self) -> Option<MatchResult> {
        match self {
            Self::Match(m) => Some(m),
            Self::FetchFailed(_) => None,
        }
    }
}

/// Statistics of a search, final once its stream is exhausted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Objects that passed the key filter
    pub objects_listed: usize,
    /// Objects fetched and scanned
    pub objects_scanned: u64,
    /// Bytes scanned across all objects
    pub bytes_scanned: u64,
    /// Objects that could not be fetched
    pub fetch_failures: u64,
    /// Matching lines found
    pub matches: u64,
    /// Workers dispatched
    pub workers: usize,
    /// Time since the search started
    pub elapsed: Duration,
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found {} matches in {} of {} objects ({} bytes, {} failed) in {}",
            self.matches,
            self.objects_scanned,
            self.objects_listed,
            self.bytes_scanned,
            self.fetch_failures,
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_lossy() {
        let result = MatchResult {
            key: "key0".to_string(),
            line_number: 2,
            excerpt: b"Blueberry\xffcake".to_vec(),
        };
        assert_eq!(result.excerpt_lossy(), "Blueberry\u{FFFD}cake");
    }

    #[test]
    fn test_fetch_failure_display() {
        let failure = FetchFailure {
            key: "key3".to_string(),
            error: StoreError::unavailable("access denied"),
        };
        assert_eq!(failure.to_string(), "Store unavailable: access denied:key3");
    }

    #[test]
    fn test_into_match() {
        let event = SearchEvent::Match(MatchResult {
            key: "k".to_string(),
            line_number: 1,
            excerpt: b"x".to_vec(),
        });
        assert!(event.into_match().is_some());

        let event = SearchEvent::FetchFailed(FetchFailure {
            key: "k".to_string(),
            error: StoreError::EmptyKey,
        });
        assert!(event.into_match().is_none());
    }

    #[test]
    fn test_summary_display() {
        let summary = SearchSummary {
            objects_listed: 4,
            objects_scanned: 3,
            bytes_scanned: 120,
            fetch_failures: 1,
            matches: 1,
            workers: 2,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            summary.to_string(),
            "Found 1 matches in 3 of 4 objects (120 bytes, 1 failed) in 1s 500ms"
        );
    }
}
