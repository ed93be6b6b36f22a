//! Fixed-width message framer for the Microlink serial stream.
//!
//! The UPS emits fixed 19-byte messages:
//!
//!   `<id byte><16 payload bytes><2 Fletcher check bytes>`
//!
//! There is no start-of-frame marker, so alignment is recovered from the
//! checksum: the framer only emits a frame when the 19 bytes at the head of
//! its buffer verify. On any mismatch it drops a single byte and rescans,
//! which re-synchronizes after at most one message worth of garbage.
use bytes::{Buf, BytesMut};

use super::{checksum, Frame, MSG_LEN};

/// Incremental framer. Feed arbitrary chunks with [`push`](Framer::push),
/// drain whole frames with [`next_frame`](Framer::next_frame).
pub struct Framer {
    buf: BytesMut,
    dropped: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            dropped: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempt to extract the next complete frame. Returns `None` when fewer
    /// than 19 aligned-and-valid bytes are buffered. Never fails: malformed
    /// input only advances the resynchronization scan.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while self.buf.len() >= MSG_LEN {
            let window = &self.buf[..MSG_LEN];
            if checksum::verify(window) {
                let id = window[0];
                let payload = window[1..MSG_LEN - 2].to_vec();
                self.buf.advance(MSG_LEN);
                return Some(Frame { id, payload });
            }
            // Head of buffer is not a valid message boundary: resync.
            self.buf.advance(1);
            self.dropped += 1;
        }
        None
    }

    /// Number of bytes discarded during resynchronization since the last
    /// call. Lets the engine notice desync without the framer doing I/O.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    /// Bytes currently buffered but not yet framed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
