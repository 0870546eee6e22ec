//! Request partitioning
//!
//! The provider caps the number of station ids per request, so the key set
//! for a period is cut into consecutive blocks of bounded size.

/// Splits a key list into bounded, order-preserving chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkScheduler {
    max_chunk_size: usize,
}

impl ChunkScheduler {
    /// Creates a scheduler; a zero size is treated as one
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    /// Consecutive chunks covering `keys` exactly once
    ///
    /// Every chunk is non-empty and at most `max_chunk_size` long; only the
    /// last one may be shorter. An empty key list yields no chunks.
    pub fn chunks<'a, T>(&self, keys: &'a [T]) -> std::slice::Chunks<'a, T> {
        keys.chunks(self.max_chunk_size)
    }

    /// Number of chunks `key_count` keys produce
    pub fn chunk_count(&self, key_count: usize) -> usize {
        key_count.div_ceil(self.max_chunk_size)
    }
}
