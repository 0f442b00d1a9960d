//! Cuts frames into link-sized fragments.
//!
//! Fragments are fire-and-forget: no acknowledgment, no retransmission, no
//! flow control. In [FragmentMode::Raw] the fragments are bare slices of the
//! frame and the receiver finds frame boundaries on its own by hunting for
//! the magic marker. [FragmentMode::Sequenced] prefixes each fragment with a
//! wrapping `u16` so the receiver can tell when it lost one.

use crate::config::{FragmentMode, ProtocolConfig, SEQUENCE_HEADER_LEN};

/// Splits frames into fragments no larger than the MTU.
#[derive(Debug, Clone)]
pub struct Chunker {
    mtu: usize,
    mode: FragmentMode,
    next_seq: u16,
}

impl Chunker {
    /// A chunker for `protocol`. Assumes the config was validated, so the MTU
    /// fits at least one payload byte.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self::with_mtu(protocol.mtu, protocol.fragment_mode)
    }

    /// A chunker with an explicit MTU and mode.
    pub fn with_mtu(mtu: usize, mode: FragmentMode) -> Self {
        Self {
            mtu,
            mode,
            next_seq: 0,
        }
    }

    /// Frame bytes carried by one fragment.
    pub fn payload_per_fragment(&self) -> usize {
        match self.mode {
            FragmentMode::Raw => self.mtu.max(1),
            FragmentMode::Sequenced => self.mtu.saturating_sub(SEQUENCE_HEADER_LEN).max(1),
        }
    }

    /// Split `frame` into fragments, in send order.
    pub fn split(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        frame
            .chunks(self.payload_per_fragment())
            .map(|chunk| match self.mode {
                FragmentMode::Raw => chunk.to_vec(),
                FragmentMode::Sequenced => {
                    let mut fragment = Vec::with_capacity(SEQUENCE_HEADER_LEN + chunk.len());
                    fragment.extend_from_slice(&self.next_seq.to_le_bytes());
                    fragment.extend_from_slice(chunk);
                    self.next_seq = self.next_seq.wrapping_add(1);
                    fragment
                }
            })
            .collect()
    }
}

/// Bare, header-less split of `frame` into slices of at most `mtu` bytes.
pub fn fragments(frame: &[u8], mtu: usize) -> impl Iterator<Item = &[u8]> {
    frame.chunks(mtu.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_fragments_reassemble_by_concatenation() {
        let frame: Vec<u8> = (0..196u32).map(|b| b as u8).collect();
        let mut chunker = Chunker::with_mtu(20, FragmentMode::Raw);
        let parts = chunker.split(&frame);

        assert_eq!(parts.len(), 10);
        assert!(parts.iter().all(|p| p.len() <= 20));
        assert_eq!(parts.last().unwrap().len(), 16);
        assert_eq!(parts.concat(), frame);
    }

    #[test]
    fn sequenced_fragments_carry_wrapping_counter() {
        let frame = vec![0xAA; 40];
        let mut chunker = Chunker::with_mtu(20, FragmentMode::Sequenced);
        chunker.next_seq = u16::MAX;
        let parts = chunker.split(&frame);

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() <= 20));
        assert_eq!(&parts[0][..2], &[0xFF, 0xFF]);
        assert_eq!(&parts[1][..2], &[0x00, 0x00]);
        assert_eq!(&parts[2][..2], &[0x01, 0x00]);
        let payload: Vec<u8> = parts.iter().flat_map(|p| p[2..].to_vec()).collect();
        assert_eq!(payload, frame);
    }

    #[test]
    fn free_function_matches_raw_mode() {
        let frame = vec![1, 2, 3, 4, 5];
        let parts: Vec<&[u8]> = fragments(&frame, 2).collect();
        assert_eq!(parts, vec![&[1, 2][..], &[3, 4][..], &[5][..]]);
    }
}
