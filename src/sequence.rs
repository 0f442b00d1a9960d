//! Watches frame ids go by and counts the ones that never arrived.
//!
//! Frame ids only exist so that the consumer can *see* loss. Nothing here
//! asks for a retransmission; a missing frame is just counted and logged.

use log::warn;

/// What one new frame id says about the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// The first frame we have seen.
    First,
    /// Exactly the id we expected.
    InOrder,
    /// Some frames were skipped.
    Gap {
        /// how many ids were skipped
        missed: u16,
    },
    /// The same id again, e.g. the device restarted or the frame was
    /// emitted twice after a false resync.
    Repeat,
}

/// Frame id continuity tracker with wrap-around.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    last: Option<u16>,
    received: u64,
    missed: u64,
}

impl FrameSequence {
    /// A tracker that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `frame_id` and classify it.
    ///
    /// A jump of more than half the id space is indistinguishable from the
    /// sender having restarted, it is still counted as a gap.
    pub fn observe(&mut self, frame_id: u16) -> SequenceEvent {
        self.received += 1;
        let event = match self.last {
            None => SequenceEvent::First,
            Some(last) if last == frame_id => SequenceEvent::Repeat,
            Some(last) => {
                let missed = frame_id.wrapping_sub(last.wrapping_add(1));
                if missed == 0 {
                    SequenceEvent::InOrder
                } else {
                    self.missed += missed as u64;
                    warn!(
                        "frame id jumped from {} to {}, {} frames lost",
                        last, frame_id, missed
                    );
                    SequenceEvent::Gap { missed }
                }
            }
        };
        self.last = Some(frame_id);
        event
    }

    /// Frames observed so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames known to be lost so far
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Fraction of frames that arrived, `1.0` before anything went missing.
    pub fn delivery_ratio(&self) -> f64 {
        let total = self.received + self.missed;
        if total == 0 {
            1.0
        } else {
            self.received as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_stream() {
        let mut seq = FrameSequence::new();
        assert_eq!(seq.observe(10), SequenceEvent::First);
        assert_eq!(seq.observe(11), SequenceEvent::InOrder);
        assert_eq!(seq.observe(12), SequenceEvent::InOrder);
        assert_eq!(seq.missed(), 0);
        assert_eq!(seq.delivery_ratio(), 1.0);
    }

    #[test]
    fn gaps_wrap_around() {
        let mut seq = FrameSequence::new();
        seq.observe(u16::MAX - 1);
        assert_eq!(seq.observe(1), SequenceEvent::Gap { missed: 2 });
        assert_eq!(seq.observe(2), SequenceEvent::InOrder);
        assert_eq!(seq.missed(), 2);
        assert_eq!(seq.received(), 3);
        assert!((seq.delivery_ratio() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn repeats_are_not_gaps() {
        let mut seq = FrameSequence::new();
        seq.observe(5);
        assert_eq!(seq.observe(5), SequenceEvent::Repeat);
        assert_eq!(seq.missed(), 0);
    }
}
