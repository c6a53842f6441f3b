use bytes::{Bytes, BytesMut};
use log::debug;

/// What happened to the buffer after a backend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Kept for the next packet; carries the buffered length.
    Retained(usize),
    /// Frames were extracted and the buffer was emptied.
    Cleared(Bytes),
    /// The ceiling was exceeded without a frame; everything was dropped.
    Overflowed(Bytes),
}

/// Grows a contiguous byte buffer from incoming packets until a backend
/// extracts frames from it, or until it passes the ceiling.
///
/// The buffer is never trimmed: H.264 framing needs contiguous bytes from a
/// NAL boundary, so the only ways out are a full clear or a full discard.
#[derive(Debug)]
pub struct PacketAccumulator {
    buffer: BytesMut,
    ceiling: usize,
}

impl PacketAccumulator {
    pub fn new(ceiling: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            ceiling,
        }
    }

    /// Appends `packet` as-is. Zero-length packets are a no-op.
    pub fn append(&mut self, packet: &[u8]) {
        if packet.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(packet);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn is_over_ceiling(&self) -> bool {
        self.buffer.len() > self.ceiling
    }

    /// Settles the buffer after a backend attempt.
    ///
    /// Clears it when `extracted` is set, discards it when it is over the
    /// ceiling, and otherwise keeps it so NAL units split across packets can
    /// still assemble. A cleared or discarded snapshot is handed back.
    pub fn snapshot_and_maybe_reset(&mut self, extracted: bool) -> Disposition {
        if extracted {
            return Disposition::Cleared(self.buffer.split().freeze());
        }
        if self.is_over_ceiling() {
            let dropped = self.buffer.split().freeze();
            debug!(
                "Packet buffer over ceiling ({} > {} bytes), discarding",
                dropped.len(),
                self.ceiling
            );
            return Disposition::Overflowed(dropped);
        }
        Disposition::Retained(self.buffer.len())
    }

    /// Drops everything buffered so far.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_packets_concatenate() {
        let mut acc = PacketAccumulator::new(64);
        acc.append(&[0, 0, 1, 0x67]);
        acc.append(&[0x42, 0x00]);
        assert_eq!(acc.as_slice(), &[0, 0, 1, 0x67, 0x42, 0x00]);
        assert_eq!(acc.snapshot_and_maybe_reset(false), Disposition::Retained(6));
        assert_eq!(acc.len(), 6);
    }

    #[test]
    fn empty_packet_is_noop() {
        let mut acc = PacketAccumulator::new(64);
        acc.append(&[1, 2, 3]);
        acc.append(&[]);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn extraction_clears_and_returns_snapshot() {
        let mut acc = PacketAccumulator::new(64);
        acc.append(b"frame");
        match acc.snapshot_and_maybe_reset(true) {
            Disposition::Cleared(bytes) => assert_eq!(&bytes[..], b"frame"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(acc.is_empty());
    }

    #[test]
    fn exceeding_ceiling_discards_everything() {
        let mut acc = PacketAccumulator::new(8);
        acc.append(&[7; 8]);
        assert_eq!(acc.snapshot_and_maybe_reset(false), Disposition::Retained(8));

        acc.append(&[7]);
        assert!(acc.is_over_ceiling());
        assert!(matches!(
            acc.snapshot_and_maybe_reset(false),
            Disposition::Overflowed(ref b) if b.len() == 9
        ));
        assert!(acc.is_empty());

        acc.append(&[1, 2]);
        assert_eq!(acc.as_slice(), &[1, 2]);
    }
}
