//! Host-side frame reassembly.
//!
//! The link hands us fragments in send order, with holes wherever a fragment
//! got lost. Fragment boundaries mean nothing, so the reassembler keeps a
//! byte buffer, hunts for the magic marker and cuts a frame once it has
//! `frame_len` bytes starting at a marker.
//!
//! Once a frame is cut, the hunt restarts right after it. That means magic
//! bytes inside the payload of an aligned frame are never mistaken for a
//! frame start. While hunting after a loss, though, a payload that happens to
//! contain the marker *will* be taken as a frame start: the reassembler
//! emits one misaligned frame and realigns at the next real marker. The
//! frame id continuity check on the consumer side is what notices.
//!
//! One reassembler per link. It is plain synchronous state, never share it.

use crate::config::{FragmentMode, ProtocolConfig, SEQUENCE_HEADER_LEN};

use log::{debug, trace};

/// Running counters, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Complete frames handed out
    pub frames: u64,
    /// Bytes thrown away while hunting for a marker
    pub discarded_bytes: u64,
    /// Times bytes had to be thrown away to find a marker
    pub resyncs: u64,
    /// Sequence jumps seen in [FragmentMode::Sequenced]
    pub sequence_gaps: u64,
}

/// Turns a fragment stream back into frames.
#[derive(Debug, Clone)]
pub struct FrameReassembler {
    frame_len: usize,
    magic: [u8; 2],
    mode: FragmentMode,
    buffer: Vec<u8>,
    expected_seq: u16,
    stats: ReassemblyStats,
}

impl FrameReassembler {
    /// A reassembler for the frames described by `protocol`.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self::with_layout(protocol.frame_len(), protocol.magic, protocol.fragment_mode)
    }

    /// A reassembler for `frame_len` byte frames starting with `magic`.
    pub fn with_layout(frame_len: usize, magic: u16, mode: FragmentMode) -> Self {
        Self {
            frame_len: frame_len.max(2),
            magic: magic.to_le_bytes(),
            mode,
            buffer: Vec::with_capacity(2 * frame_len),
            expected_seq: 0,
            stats: ReassemblyStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one fragment, get back every frame it completed, oldest first.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<Vec<u8>> {
        let data = match self.mode {
            FragmentMode::Raw => fragment,
            FragmentMode::Sequenced => match self.strip_sequence(fragment) {
                Some(data) => data,
                None => return Vec::new(),
            },
        };
        if data.is_empty() {
            return Vec::new();
        }

        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.find_magic() else {
                // keep the last byte, it may be the first half of a marker
                let keep_from = self.buffer.len().saturating_sub(1);
                self.discard(keep_from);
                break;
            };
            if start > 0 {
                self.discard(start);
            }
            if self.buffer.len() < self.frame_len {
                break;
            }

            let frame: Vec<u8> = self.buffer.drain(..self.frame_len).collect();
            self.stats.frames += 1;
            trace!("reassembled frame #{}", self.stats.frames);
            frames.push(frame);
        }

        frames
    }

    /// Forget any half-built frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn find_magic(&self) -> Option<usize> {
        self.buffer.windows(2).position(|w| w == self.magic)
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug!("discarding {} bytes while looking for a frame start", n);
        self.buffer.drain(..n);
        self.stats.discarded_bytes += n as u64;
        self.stats.resyncs += 1;
    }

    fn strip_sequence<'a>(&mut self, fragment: &'a [u8]) -> Option<&'a [u8]> {
        if fragment.len() < SEQUENCE_HEADER_LEN {
            return None;
        }
        let seq = u16::from_le_bytes([fragment[0], fragment[1]]);
        if seq != self.expected_seq {
            if !self.buffer.is_empty() {
                debug!(
                    "fragment sequence jumped from {} to {}, dropping {} buffered bytes",
                    self.expected_seq,
                    seq,
                    self.buffer.len()
                );
                self.stats.discarded_bytes += self.buffer.len() as u64;
                self.buffer.clear();
            }
            self.stats.sequence_gaps += 1;
        }
        self.expected_seq = seq.wrapping_add(1);
        Some(&fragment[SEQUENCE_HEADER_LEN..])
    }
}
