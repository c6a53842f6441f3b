use log::{debug, warn};
use openh264::decoder::{DecodedYUV, Decoder};
use openh264::formats::YUVSource;

use super::DecodeBackend;
use crate::error::BackendError;
use crate::frame::{DecodedFrame, BGR_CHANNELS};
use crate::h264::{self, NalKind, UnitAssembler};

pub(super) const NAME: &str = "native";

/// openh264 wrapped behind the backend contract; the reference behaviour the
/// other backends imitate.
///
/// The decoder is stateful (reference pictures, SPS/PPS), so every NAL unit
/// is fed to it exactly once, in stream order, as soon as the start code of
/// the next unit shows it is complete.
pub struct NativeBackend {
    decoder: Decoder,
    units: UnitAssembler,
}

impl NativeBackend {
    pub fn new() -> Result<Self, BackendError> {
        let decoder = Decoder::new().map_err(|e| BackendError::unavailable(NAME, format!("{e:?}")))?;
        Ok(Self {
            decoder,
            units: UnitAssembler::new(),
        })
    }
}

impl DecodeBackend for NativeBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        self.units.update(buffer);

        let mut frames = Vec::new();
        let mut saw_picture = false;
        for unit in h264::nal_units(self.units.take_new()) {
            let kind = h264::nal_kind(unit);
            saw_picture |= kind.is_some_and(NalKind::is_picture);
            match self.decoder.decode(unit) {
                Ok(Some(decoded_yuv)) => match bgr_frame(&decoded_yuv) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => warn!("Skipping decoded picture: {}", e),
                },
                Ok(None) => {
                    // Decoder needs more data or produced no output this time, normal
                }
                Err(e) => {
                    debug!("openh264 rejected {:?} unit of {} bytes: {:?}", kind, unit.len(), e);
                }
            }
        }

        if frames.is_empty() && !saw_picture {
            debug!("No complete picture NAL yet, {} bytes pending", self.units.pending_len());
        }

        Ok(frames)
    }

    fn buffer_cleared(&mut self) {
        self.units.source_cleared();
    }

    fn buffer_discarded(&mut self) {
        self.units.reset();
    }
}

// openh264 writes packed RGB; frames are BGR.
fn bgr_frame(decoded_yuv: &DecodedYUV<'_>) -> Result<DecodedFrame, BackendError> {
    let (width, height) = decoded_yuv.dimensions();
    let mut image = vec![0u8; width * height * BGR_CHANNELS];
    decoded_yuv.write_rgb8(&mut image);
    for pixel in image.chunks_exact_mut(BGR_CHANNELS) {
        pixel.swap(0, 2);
    }
    DecodedFrame::packed(image, width, height).map_err(|e| BackendError::failed(NAME, e))
}
