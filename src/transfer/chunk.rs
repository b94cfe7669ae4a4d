/// Fixed transfer chunk size: 5 MiB, the resumable-upload granularity the
/// drive protocol expects.
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// One byte range of a fixed-size transfer. `end` is inclusive, matching the
/// wire form `Content-Range: bytes <start>-<end>/<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_last(&self) -> bool {
        self.end + 1 == self.total
    }

    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Bookkeeping for one upload. `transferred` only advances through [`ack`],
/// i.e. after the remote side accepted the chunk, so an abandoned session
/// reports exactly the prefix the store holds.
///
/// [`ack`]: TransferSession::ack
#[derive(Debug)]
pub struct TransferSession {
    total: u64,
    transferred: u64,
    chunk_size: u64,
}

impl TransferSession {
    pub fn new(total: u64) -> Self {
        Self::resumed(total, 0)
    }

    /// Continue a transfer whose first `acked` bytes the store already holds.
    pub fn resumed(total: u64, acked: u64) -> Self {
        Self {
            total,
            transferred: acked.min(total),
            chunk_size: CHUNK_SIZE,
        }
    }

    #[cfg(test)]
    fn with_chunk_size(total: u64, chunk_size: u64) -> Self {
        Self {
            total,
            transferred: 0,
            chunk_size,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }

    /// The next range to send, or `None` once everything is acknowledged.
    pub fn next_chunk(&self) -> Option<Chunk> {
        if self.is_complete() {
            return None;
        }
        let start = self.transferred;
        let end = (start + self.chunk_size).min(self.total) - 1;
        Some(Chunk {
            start,
            end,
            total: self.total,
        })
    }

    pub fn ack(&mut self, chunk: &Chunk) {
        debug_assert_eq!(chunk.start, self.transferred);
        self.transferred = chunk.end + 1;
    }
}
