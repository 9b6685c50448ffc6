//! Abstraction over the application's message payload.
//!
//! The kernel source traverses a user-space `iov_iter`; this crate has no
//! such concept, so [`ByteSource`] stands in for it. Most callers that
//! already hold the full message in memory use [`SliceSource`].

use bytes::Bytes;
use std::error::Error as StdError;

/// Produces a message's payload bytes on demand, one packet-sized chunk at a
/// time, in order.
pub trait ByteSource {
    type Error: StdError + Send + Sync + 'static;

    /// Copy up to `max_len` bytes starting at `offset` into a fresh `Bytes`.
    /// Returns fewer than `max_len` bytes only at the end of the source.
    fn read_at(&mut self, offset: u32, max_len: u32) -> Result<Bytes, Self::Error>;
}

/// A `ByteSource` over an in-memory buffer. Never fails.
pub struct SliceSource {
    data: Bytes,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        SliceSource { data: data.into() }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unreachable: SliceSource never fails")]
pub struct Infallible(());

impl ByteSource for SliceSource {
    type Error = Infallible;

    fn read_at(&mut self, offset: u32, max_len: u32) -> Result<Bytes, Self::Error> {
        let offset = offset as usize;
        let end = (offset + max_len as usize).min(self.data.len());
        if offset >= self.data.len() {
            return Ok(Bytes::new());
        }
        Ok(self.data.slice(offset..end))
    }
}
