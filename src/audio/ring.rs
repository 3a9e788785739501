//! Time-indexed ring buffer backing the window assembler.
//!
//! A fixed circular byte buffer holding the most recent stretch of the
//! capture stream, addressable by stream time instead of a read cursor.
//! Reads never consume: the window buffer copies arbitrary `[t_from,
//! t_to]` ranges while the capture thread keeps appending.
//!
//! Invariant: after any call, logical offsets `[0, filled)` correspond
//! sample-accurately to stream times `[start_t, end_t]`.

use crate::defaults::BYTES_PER_SEC;

/// Slack for float time comparisons, well below one sample period.
const TIME_EPS: f64 = 1e-6;

/// Fixed-capacity circular byte buffer indexed by stream time.
pub struct RingBuffer {
    buf: Vec<u8>,
    cap: usize,
    /// Next physical write index.
    write_pos: usize,
    /// Valid bytes, saturating at `cap`.
    filled: usize,
    /// Stream time of the last written byte.
    end_t: f64,
}

impl RingBuffer {
    /// Creates a ring holding `capacity_sec` seconds of 16 kHz mono PCM.
    pub fn new(capacity_sec: f64) -> Self {
        let mut cap = (capacity_sec * BYTES_PER_SEC as f64).ceil() as usize;
        cap &= !1; // whole samples only
        Self {
            buf: vec![0u8; cap.max(2)],
            cap: cap.max(2),
            write_pos: 0,
            filled: 0,
            end_t: 0.0,
        }
    }

    /// Stream time of the oldest buffered byte.
    pub fn start_t(&self) -> f64 {
        self.end_t - self.filled as f64 / BYTES_PER_SEC as f64
    }

    /// Stream time of the newest buffered byte.
    pub fn end_t(&self) -> f64 {
        self.end_t
    }

    /// Valid bytes currently buffered.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Appends a frame ending at stream time `t_end`. The oldest audio is
    /// overwritten when full; every incoming byte is written exactly once.
    pub fn write(&mut self, bytes: &[u8], t_end: f64) {
        // A frame larger than the ring keeps only its newest tail.
        let bytes = if bytes.len() > self.cap {
            &bytes[bytes.len() - self.cap..]
        } else {
            bytes
        };

        let first = (self.cap - self.write_pos).min(bytes.len());
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&bytes[first..]);
        }

        self.write_pos = (self.write_pos + bytes.len()) % self.cap;
        self.filled = (self.filled + bytes.len()).min(self.cap);
        self.end_t = t_end;
    }

    /// Byte offset of stream time `t` within the buffered range.
    ///
    /// Returns `None` when `t` lies outside `[start_t, end_t]`. The right
    /// boundary is valid and maps to `filled`, so callers can request
    /// "from now" as an empty span without an out-of-range failure.
    pub fn logical_offset(&self, t: f64) -> Option<usize> {
        let start = self.start_t();
        if t < start - TIME_EPS || t > self.end_t + TIME_EPS {
            return None;
        }
        let mut offset = ((t - start) * BYTES_PER_SEC as f64).round() as usize;
        offset &= !1;
        Some(offset.min(self.filled))
    }

    /// Copies `[t_from, t_to]` into `dst`, returning the bytes copied.
    ///
    /// `t_to` is clamped to the newest buffered time. An out-of-range
    /// `t_from` copies nothing: shifting into older audio would replay
    /// material the caller already consumed. The copied length is always
    /// even (whole samples).
    pub fn copy_range(&self, t_from: f64, t_to: f64, dst: &mut Vec<u8>) -> usize {
        let Some(from) = self.logical_offset(t_from) else {
            return 0;
        };
        let to = match self.logical_offset(t_to.min(self.end_t)) {
            Some(to) => to,
            None => return 0,
        };
        if to <= from {
            return 0;
        }

        let len = (to - from) & !1;
        dst.reserve(len);
        for i in 0..len {
            dst.push(self.buf[self.physical(from + i)]);
        }
        len
    }

    /// Logical offset → physical index, per the fill state.
    fn physical(&self, offset: usize) -> usize {
        if self.filled == self.cap {
            (self.write_pos + offset) % self.cap
        } else {
            offset
        }
    }
}
