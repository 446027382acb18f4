use memchr::{memchr, memmem};

/// Target length of an excerpt. Lines up to this length are returned whole.
pub const MAX_EXCERPT_LENGTH: usize = 120;

/// Returns a bounded excerpt of `line` around the first occurrence of `query`.
///
/// The window is centred on the match and then widened to word boundaries,
/// so the result may be somewhat longer than [`MAX_EXCERPT_LENGTH`]. It never
/// cuts into the match itself. If `query` does not occur, the window starts at
/// the beginning of the line.
pub fn excerpt<'a>(line: &'a [u8], query: &[u8]) -> &'a [u8] {
    if line.len() <= MAX_EXCERPT_LENGTH {
        return line;
    }
    let index = memmem::find(line, query).unwrap_or(0);
    excerpt_at(line, index, query.len())
}

/// Same as [`excerpt`] for a match already located at `index..index + len`.
pub fn excerpt_at(line: &[u8], index: usize, len: usize) -> &[u8] {
    if line.len() <= MAX_EXCERPT_LENGTH {
        return line;
    }
    let match_end = (index + len).min(line.len());
    let index = index.min(match_end);
    let half = MAX_EXCERPT_LENGTH.saturating_sub(len) / 2;

    let start = word_start(line, index.saturating_sub(half), index);
    let end = word_end(line, (match_end + half).min(line.len()));
    &line[start..end]
}

/// Moves `start` forward so the excerpt does not begin mid-word, without
/// passing `limit` (the first byte of the match).
fn word_start(line: &[u8], start: usize, limit: usize) -> usize {
    if start >= limit {
        return start;
    }
    if line[start] == b' ' {
        return start + 1;
    }
    if start == 0 {
        return start;
    }
    match memchr(b' ', &line[start..limit]) {
        Some(offset) => start + offset + 1,
        None => start,
    }
}

/// Moves `end` forward to the next space so the excerpt does not stop
/// mid-word. The space itself is not included.
fn word_end(line: &[u8], end: usize) -> usize {
    if end >= line.len() {
        return line.len();
    }
    match memchr(b' ', &line[end..]) {
        Some(offset) => end + offset,
        None => line.len(),
    }
}
