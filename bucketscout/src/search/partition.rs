use std::num::NonZeroUsize;

/// Divides `objects` into at most `desired` contiguous chunks of
/// `ceil(len / desired)` items, the last one possibly shorter.
///
/// Concatenating the chunks yields the input exactly. An empty input yields no
/// chunks, and empty chunks are never produced, so there can be fewer chunks
/// than `desired` when the list is short.
pub fn partition<T>(objects: &[T], desired: NonZeroUsize) -> Vec<&[T]> {
    if objects.is_empty() {
        return Vec::new();
    }
    let chunk_size = objects.len().div_ceil(desired.get());
    objects.chunks(chunk_size).collect()
}

/// Parallelism used when none is configured: one unit per CPU, minus one for
/// the collecting thread, never below one.
pub fn default_parallelism() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().saturating_sub(1)).unwrap_or(NonZeroUsize::MIN)
}
