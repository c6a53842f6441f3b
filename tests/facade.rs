//! End-to-end behaviour of the decoder facade through the public API, with
//! scripted backends standing in for real decoders.

use std::sync::{Arc, Mutex};

use tello_video::decoder::{DecodeBackend, DecodeStatus, DecoderFacade, UnavailableBackend};
use tello_video::error::BackendError;
use tello_video::frame::{make_test_frame, DecodedFrame};
use tello_video::h264::{nal_kind, nal_units, NalKind};
use tello_video::{BackendKind, DecoderConfig};

/// Records every buffer it is shown and never completes a frame.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl DecodeBackend for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        self.seen.lock().unwrap().push(buffer.to_vec());
        Ok(Vec::new())
    }
}

/// Emits one frame per complete picture NAL, like a decoder with no delay:
/// a picture counts as complete once another start code follows it.
struct PictureCounter;

impl DecodeBackend for PictureCounter {
    fn name(&self) -> &'static str {
        "picture-counter"
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        let units: Vec<&[u8]> = nal_units(buffer).collect();
        let complete = units.len().saturating_sub(1);
        Ok(units[..complete]
            .iter()
            .filter(|u| nal_kind(u).is_some_and(NalKind::is_picture))
            .map(|_| make_test_frame(8, 4).unwrap())
            .collect())
    }
}

fn recorder_facade(ceiling: usize) -> (DecoderFacade, Recorder) {
    let recorder = Recorder::default();
    let facade = DecoderFacade::with_backend(Box::new(recorder.clone()), false, ceiling);
    (facade, recorder)
}

#[test]
fn decode_never_fails_on_arbitrary_packets() {
    let (mut facade, _) = recorder_facade(4096);
    let packets: Vec<Vec<u8>> = vec![
        vec![],
        vec![0xFF; 1460],
        vec![0, 0, 1],
        vec![0, 0, 0, 1, 0x65],
        (0..=255).collect(),
        vec![0; 3000],
    ];
    for packet in &packets {
        assert!(facade.decode(packet).is_empty());
    }
}

#[test]
fn consecutive_packets_reach_backend_concatenated() {
    let (mut facade, recorder) = recorder_facade(1024);
    facade.decode(&[0, 0, 0, 1, 0x67]);
    facade.decode(&[0x42, 0xC0, 0x1E]);

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], vec![0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1E]);
    assert_eq!(facade.buffered_len(), 8);
}

#[test]
fn overflow_restarts_from_empty_buffer() {
    let (mut facade, recorder) = recorder_facade(1_048_576);
    let chunk = vec![0x11; 1_100_000];
    assert!(facade.decode(&chunk).is_empty());
    assert_eq!(
        facade.status(),
        DecodeStatus::Overflow {
            discarded: 1_100_000
        }
    );

    facade.decode(&[0, 0, 1, 0x41]);
    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.last().unwrap(), &vec![0, 0, 1, 0x41]);
}

#[test]
fn empty_packet_does_not_reset_or_reach_backend() {
    let (mut facade, recorder) = recorder_facade(1024);
    facade.decode(&[1, 2, 3]);
    assert!(facade.decode(b"").is_empty());
    assert_eq!(facade.buffered(), &[1, 2, 3]);
    assert_eq!(recorder.seen.lock().unwrap().len(), 1);
}

#[test]
fn fallback_mode_is_empty_regardless_of_history() {
    let mut facade = DecoderFacade::with_backend(Box::new(PictureCounter), true, 1024);
    let stream: [&[u8]; 4] = [
        &[0, 0, 0, 1, 0x67, 0x42],
        &[0, 0, 0, 1, 0x65, 0x88],
        &[0, 0, 0, 1, 0x41, 0x9A],
        &[0, 0, 0, 1, 0x41, 0x9B],
    ];
    for packet in stream {
        assert!(facade.decode(packet).is_empty());
    }
    assert_eq!(facade.buffered_len(), 0);
}

#[test]
fn nal_split_across_packets_still_assembles() {
    let mut facade = DecoderFacade::with_backend(Box::new(PictureCounter), false, 1024);
    // SPS, then an IDR slice torn across three datagrams
    assert!(facade.decode(&[0, 0, 0, 1, 0x67, 0x42, 0xC0]).is_empty());
    assert!(facade.decode(&[0, 0, 0, 1, 0x65, 0x88]).is_empty());
    assert!(facade.decode(&[0x84, 0x21, 0x00]).is_empty());
    assert!(matches!(facade.status(), DecodeStatus::Incomplete { .. }));

    // the next start code closes the IDR
    let frames = facade.decode(&[0, 0, 0, 1, 0x41, 0x9A]);
    assert_eq!(frames.len(), 1);
    assert_eq!(facade.status(), DecodeStatus::Frames(1));
    assert_eq!(facade.buffered_len(), 0);

    let (image, width, height, linesize) = frames.into_iter().next().unwrap().into_parts();
    assert_eq!((width, height, linesize), (8, 4, 24));
    assert_eq!(image.len(), 8 * 4 * 3);
}

#[test]
fn unavailable_backend_is_visible_before_decoding() {
    let mut facade =
        DecoderFacade::with_backend(Box::new(UnavailableBackend::new("native", "no library")), false, 1024);
    assert!(!facade.is_backend_available());
    assert!(facade.decode(&[0, 0, 0, 1, 0x65]).is_empty());
    assert_eq!(facade.status(), DecodeStatus::Unavailable);

    facade.set_backend(Box::new(PictureCounter));
    assert!(facade.is_backend_available());
}

#[test]
fn subprocess_backend_without_tool_degrades_to_empty() {
    let mut config = DecoderConfig {
        backend: BackendKind::Subprocess,
        ..DecoderConfig::default()
    };
    config.subprocess.program = "/nonexistent/tello-video/ffmpeg".into();

    let mut facade = DecoderFacade::new(&config);
    assert_eq!(facade.backend_name(), "subprocess");
    assert!(!facade.is_backend_available());
    assert!(facade.decode(&[0, 0, 0, 1, 0x67, 0x42]).is_empty());
    assert_eq!(facade.status(), DecodeStatus::Unavailable);
}

#[cfg(not(feature = "vision"))]
#[test]
fn vision_backend_missing_from_build_is_unavailable() {
    let config = DecoderConfig {
        backend: BackendKind::VisionLibrary,
        ..DecoderConfig::default()
    };
    let facade = DecoderFacade::new(&config);
    assert_eq!(facade.backend_name(), "vision-library");
    assert!(!facade.is_backend_available());
}

#[cfg(feature = "native")]
#[test]
fn native_backend_treats_garbage_as_incomplete() {
    let config = DecoderConfig::default();
    let mut facade = DecoderFacade::new(&config);
    assert_eq!(facade.backend_name(), "native");
    assert!(facade.is_backend_available());

    assert!(facade.decode(&[0, 0, 0, 1, 0x65, 0xFF, 0xFF]).is_empty());
    assert!(facade.decode(&[0xDE, 0xAD, 0xBE, 0xEF]).is_empty());
    assert!(matches!(
        facade.status(),
        DecodeStatus::Incomplete { .. } | DecodeStatus::Failed
    ));
}

#[cfg(feature = "native")]
mod native_stream {
    use openh264::decoder::Decoder;
    use openh264::encoder::Encoder;
    use openh264::formats::{RgbSliceU8, YUVBuffer};

    use super::*;

    const WIDTH: usize = 320;
    const HEIGHT: usize = 240;
    const DATAGRAM: usize = 1460;

    /// A colour gradient sliding sideways a little every frame.
    fn encoded_clip(frames: usize) -> Vec<u8> {
        let mut encoder = Encoder::new().unwrap();
        let mut stream = Vec::new();
        for n in 0..frames {
            let mut rgb = vec![0u8; WIDTH * HEIGHT * 3];
            for (i, pixel) in rgb.chunks_exact_mut(3).enumerate() {
                let (x, y) = (i % WIDTH, i / WIDTH);
                pixel[0] = ((x + n * 8) % 256) as u8;
                pixel[1] = (y % 256) as u8;
                pixel[2] = ((x + y + n * 4) % 256) as u8;
            }
            let yuv = YUVBuffer::from_rgb8_source(RgbSliceU8::new(&rgb, (WIDTH, HEIGHT)));
            encoder.encode(&yuv).unwrap().write_vec(&mut stream);
        }
        stream
    }

    /// Pictures openh264 yields when handed every complete unit in one pass.
    fn reference_frame_count(stream: &[u8]) -> usize {
        let mut decoder = Decoder::new().unwrap();
        let units: Vec<&[u8]> = nal_units(stream).collect();
        // nothing follows the last unit to close it
        units[..units.len() - 1]
            .iter()
            .filter(|unit| matches!(decoder.decode(unit), Ok(Some(_))))
            .count()
    }

    #[test]
    fn datagram_sized_packets_decode_every_complete_picture() {
        let stream = encoded_clip(10);
        let expected = reference_frame_count(&stream);
        assert!(expected >= 2, "reference decode produced {expected} frame(s)");

        let mut facade = DecoderFacade::new(&DecoderConfig::default());
        let mut frames = Vec::new();
        for packet in stream.chunks(DATAGRAM) {
            frames.extend(facade.decode(packet));
        }

        assert_eq!(frames.len(), expected);
        assert!(frames
            .iter()
            .all(|f| f.width() == WIDTH && f.height() == HEIGHT && f.stride() == WIDTH * 3));

        // red 40, green 200, blue 240 in the source: channels come out as BGR
        let [b, g, r] = frames[0].pixel(40, 200);
        assert!(b > r + 100, "b={b} g={g} r={r}");
        assert!(g > r + 80, "b={b} g={g} r={r}");
    }
}
