//! The decode thread: owns the one [`DecoderFacade`] and serialises every
//! packet through it.

use log::{debug, info};
use tokio::sync::mpsc;

use crate::decoder::{DecodeStatus, DecoderFacade};
use crate::frame::DecodedFrame;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub packets: u64,
    pub frames: u64,
    pub overflows: u64,
    pub failures: u64,
    /// Frames dropped because the consumer was behind.
    pub frames_dropped: u64,
}

/// Feeds packets from `rx_packets` into `decoder` until the channel closes or
/// the consumer hangs up, forwarding every decoded frame to `tx_frames`.
///
/// Blocking; run it on a dedicated thread, not inside the async runtime.
pub fn decode_loop(
    mut decoder: DecoderFacade,
    mut rx_packets: mpsc::Receiver<Vec<u8>>,
    tx_frames: mpsc::Sender<DecodedFrame>,
) -> DecodeStats {
    let mut stats = DecodeStats::default();
    info!(
        "Decode thread started ({} backend{})",
        decoder.backend_name(),
        if decoder.is_fallback() { ", fallback mode" } else { "" }
    );

    'packets: while let Some(packet) = rx_packets.blocking_recv() {
        stats.packets += 1;
        let frames = decoder.decode(&packet);

        match decoder.status() {
            DecodeStatus::Overflow { .. } => stats.overflows += 1,
            DecodeStatus::Failed => stats.failures += 1,
            _ => {}
        }

        for frame in frames {
            stats.frames += 1;
            match tx_frames.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    stats.frames_dropped += 1;
                    debug!("Consumer busy, dropping frame {}", stats.frames);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    info!("Frame consumer closed. Exiting decode thread.");
                    break 'packets;
                }
            }
        }
    }

    info!(
        "Decode thread finished: {} packets, {} frames ({} dropped), {} overflows, {} backend failures",
        stats.packets, stats.frames, stats.frames_dropped, stats.overflows, stats.failures
    );
    stats
}
