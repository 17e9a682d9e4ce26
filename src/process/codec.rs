//! Chunk codec for agent output pipes.
//!
//! Frames a byte stream into newline-terminated text chunks, keeping the
//! `\n` so that concatenating every chunk reproduces the stream exactly.
//! Bytes are decoded lossily. A line longer than [`MAX_CHUNK_BYTES`] is
//! split early, on a UTF-8 character boundary, so a child that never writes
//! a newline cannot grow the buffer without bound.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Largest chunk emitted without a newline: 64 KiB.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Newline-inclusive, lossy UTF-8 chunk decoder.
#[derive(Debug)]
pub struct ChunkCodec {
    max_len: usize,
    /// Offset already searched for a newline; avoids rescanning on partial reads.
    next_index: usize,
}

impl ChunkCodec {
    /// Codec with the default [`MAX_CHUNK_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_len(MAX_CHUNK_BYTES)
    }

    /// Codec that force-splits lines longer than `max_len` bytes.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(4),
            next_index: 0,
        }
    }

    fn take(&mut self, src: &mut BytesMut, end: usize) -> String {
        self.next_index = 0;
        let bytes = src.split_to(end);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let start = self.next_index.min(src.len());
        if let Some(offset) = src[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset + 1;
            return Ok(Some(self.take(src, end)));
        }

        if src.len() > self.max_len {
            let end = char_boundary(src, self.max_len);
            return Ok(Some(self.take(src, end)));
        }

        self.next_index = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let end = src.len();
        Ok(Some(self.take(src, end)))
    }
}

/// Largest cut `<= max` that does not start the remainder on a continuation byte.
///
/// Requires `buf.len() > max`.
fn char_boundary(buf: &[u8], max: usize) -> usize {
    let mut cut = max;
    while cut > max.saturating_sub(3) && cut > 0 && (buf[cut] & 0xC0) == 0x80 {
        cut -= 1;
    }
    if cut == 0 || (buf[cut] & 0xC0) == 0x80 {
        max
    } else {
        cut
    }
}
