use memchr::memmem::Finder;

use super::excerpt::excerpt_at;

/// A query, compiled once and shared read-only by every worker.
///
/// Case-insensitive matching folds both the query and each line to ASCII
/// uppercase. Folding is byte-wise, so non-ASCII letters only match in their
/// exact case, and byte offsets are identical in the folded and original line.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    query: Vec<u8>,
    ignore_case: bool,
    finder: Finder<'static>,
}

/// One matching line of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch<'a> {
    /// 1-based line number within the object
    pub line_number: usize,
    /// Byte offset of the first occurrence within the line
    pub offset: usize,
    /// The bounded excerpt around the match
    pub excerpt: &'a [u8],
}

impl QueryMatcher {
    /// Creates a matcher for `query`
    pub fn new(query: impl Into<Vec<u8>>, ignore_case: bool) -> Self {
        let query = query.into();
        let needle = if ignore_case {
            query.to_ascii_uppercase()
        } else {
            query.clone()
        };
        Self {
            query,
            ignore_case,
            finder: Finder::new(&needle).into_owned(),
        }
    }

    /// The query as given by the caller
    pub fn query(&self) -> &[u8] {
        &self.query
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Byte offset of the first occurrence of the query in `line`
    pub fn find(&self, line: &[u8]) -> Option<usize> {
        if self.ignore_case {
            self.finder.find(&line.to_ascii_uppercase())
        } else {
            self.finder.find(line)
        }
    }

    /// Checks if `line` contains the query
    pub fn is_match(&self, line: &[u8]) -> bool {
        self.find(line).is_some()
    }

    /// Scans `content` line by line and yields every matching line in order.
    ///
    /// Lines are split on `\n` with the terminator dropped; content ending in a
    /// newline therefore has a final empty line.
    pub fn scan<'a>(&'a self, content: &'a [u8]) -> impl Iterator<Item = LineMatch<'a>> + 'a {
        content
            .split(|&b| b == b'\n')
            .enumerate()
            .filter_map(move |(index, line)| {
                let offset = self.find(line)?;
                Some(LineMatch {
                    line_number: index + 1,
                    offset,
                    excerpt: excerpt_at(line, offset, self.query.len()),
                })
            })
    }
}

/// Case-aware containment test on raw bytes
pub fn case_aware_contains(haystack: &[u8], needle: &[u8], ignore_case: bool) -> bool {
    QueryMatcher::new(needle, ignore_case).is_match(haystack)
}
