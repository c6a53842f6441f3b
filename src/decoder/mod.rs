//! Decode pipeline: packet accumulation, interchangeable backends, and the
//! facade that callers feed raw UDP payloads into.

mod accumulator;
#[cfg(feature = "native")]
mod native;
mod subprocess;
#[cfg(feature = "vision")]
mod vision;

use log::{debug, info, warn};

use crate::config::{BackendKind, DecoderConfig};
use crate::error::BackendError;
use crate::frame::DecodedFrame;

pub use accumulator::{Disposition, PacketAccumulator};
#[cfg(feature = "native")]
pub use native::NativeBackend;
pub use subprocess::SubprocessBackend;
#[cfg(feature = "vision")]
pub use vision::{frame_to_mat, VisionBackend};

/// Bytes of a discarded buffer echoed to the debug log.
const LOG_HEAD_BYTES: usize = 16;

/// A strategy that turns an accumulated Annex-B buffer into frames.
///
/// Incomplete or malformed input is the steady state of a live stream and must
/// come back as `Ok(vec![])`. `Err` is reserved for faults of the backend
/// itself; the facade logs and contains those.
pub trait DecodeBackend: Send {
    fn name(&self) -> &'static str;

    /// False once the backend knows it can never produce frames.
    fn is_available(&self) -> bool {
        true
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError>;

    /// The facade emptied its buffer after frames came out. The next buffer
    /// starts with bytes never shown before; a unit left unfinished in the old
    /// one continues there.
    fn buffer_cleared(&mut self) {}

    /// The facade threw its buffer away without a frame.
    fn buffer_discarded(&mut self) {}
}

/// Stand-in for a backend that could not be built.
pub struct UnavailableBackend {
    name: &'static str,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl DecodeBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        false
    }

    fn try_decode(&mut self, _buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        Err(BackendError::unavailable(self.name, self.reason.clone()))
    }
}

/// Builds the backend named by `config.backend`.
///
/// Never fails: a backend whose dependency is missing (feature not compiled,
/// library init error, tool not on PATH) comes back as an unavailable backend,
/// which callers can detect through [`DecodeBackend::is_available`].
pub fn create_backend(config: &DecoderConfig) -> Box<dyn DecodeBackend> {
    let backend: Box<dyn DecodeBackend> = match config.backend {
        BackendKind::Native => native_backend(),
        BackendKind::VisionLibrary => vision_backend(),
        BackendKind::Subprocess => Box::new(SubprocessBackend::new(&config.subprocess)),
    };
    if backend.is_available() {
        info!("Using {} decode backend", backend.name());
    } else {
        warn!(
            "{} decode backend is unavailable; decode calls will return no frames",
            backend.name()
        );
    }
    backend
}

#[cfg(feature = "native")]
fn native_backend() -> Box<dyn DecodeBackend> {
    match NativeBackend::new() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log::error!("Failed to initialize openh264 decoder: {}", e);
            Box::new(UnavailableBackend::new(native::NAME, e.to_string()))
        }
    }
}

#[cfg(not(feature = "native"))]
fn native_backend() -> Box<dyn DecodeBackend> {
    Box::new(UnavailableBackend::new(
        "native",
        "built without the `native` feature",
    ))
}

#[cfg(feature = "vision")]
fn vision_backend() -> Box<dyn DecodeBackend> {
    Box::new(VisionBackend::new())
}

#[cfg(not(feature = "vision"))]
fn vision_backend() -> Box<dyn DecodeBackend> {
    Box::new(UnavailableBackend::new(
        "vision-library",
        "built without the `vision` feature",
    ))
}

/// Outcome of the most recent [`DecoderFacade::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Nothing decoded yet, or the last packet was empty.
    Idle,
    /// Fallback mode: decoding is switched off.
    Fallback,
    /// Not enough data for a frame yet; buffer kept.
    Incomplete { buffered: usize },
    /// Frames were extracted and the buffer cleared.
    Frames(usize),
    /// The buffer passed the ceiling without a frame and was discarded.
    Overflow { discarded: usize },
    /// The backend can never decode; packets are not buffered.
    Unavailable,
    /// The backend hit an internal fault on this attempt.
    Failed,
}

/// The decode entry point: `decode(bytes) -> frames`, whatever the backend.
///
/// Mirrors the `H264Decoder.decode(packet)` interface of libh264decoder so a
/// capture loop can swap backends, or turn decoding off, without changing the
/// call site. Not meant for concurrent use; serialise calls from one thread.
pub struct DecoderFacade {
    accumulator: PacketAccumulator,
    backend: Box<dyn DecodeBackend>,
    use_fallback_mode: bool,
    status: DecodeStatus,
    warned_unavailable: bool,
}

impl DecoderFacade {
    /// Builds the configured backend and an empty packet buffer.
    pub fn new(config: &DecoderConfig) -> Self {
        let backend = if config.use_fallback_mode {
            // nothing will ever reach it
            Box::new(UnavailableBackend::new(
                config.backend.as_str(),
                "fallback mode enabled",
            )) as Box<dyn DecodeBackend>
        } else {
            create_backend(config)
        };
        Self::with_backend(
            backend,
            config.use_fallback_mode,
            config.buffer_ceiling_bytes,
        )
    }

    pub fn with_backend(
        backend: Box<dyn DecodeBackend>,
        use_fallback_mode: bool,
        buffer_ceiling_bytes: usize,
    ) -> Self {
        if use_fallback_mode {
            info!("Decoder fallback mode enabled; no frames will be produced");
        }
        Self {
            accumulator: PacketAccumulator::new(buffer_ceiling_bytes),
            backend,
            use_fallback_mode,
            status: DecodeStatus::Idle,
            warned_unavailable: false,
        }
    }

    /// Feeds one packet and returns every frame it completed (often none).
    ///
    /// Never fails: incomplete data, overflow and backend faults all come back
    /// as an empty list, with the reason available from [`Self::status`].
    pub fn decode(&mut self, packet: &[u8]) -> Vec<DecodedFrame> {
        if self.use_fallback_mode {
            self.status = DecodeStatus::Fallback;
            return Vec::new();
        }
        if packet.is_empty() {
            self.status = DecodeStatus::Idle;
            return Vec::new();
        }
        if !self.backend.is_available() {
            self.note_unavailable(None);
            return Vec::new();
        }

        self.accumulator.append(packet);

        let (frames, fault) = match self.backend.try_decode(self.accumulator.as_slice()) {
            Ok(frames) => (frames, None),
            Err(e) => (Vec::new(), Some(e)),
        };

        let disposition = self.accumulator.snapshot_and_maybe_reset(!frames.is_empty());
        match &disposition {
            Disposition::Cleared(_) => self.backend.buffer_cleared(),
            Disposition::Overflowed(_) => self.backend.buffer_discarded(),
            Disposition::Retained(_) => {}
        }
        self.status = match (&disposition, fault) {
            (_, Some(e)) if e.is_permanent() => {
                self.accumulator.reset();
                self.backend.buffer_discarded();
                self.note_unavailable(Some(&e));
                DecodeStatus::Unavailable
            }
            (Disposition::Overflowed(dropped), fault) => {
                match fault {
                    Some(e) => warn!("{} backend error with full buffer: {}", self.backend.name(), e),
                    None => warn!(
                        "No frame in {} buffered bytes (ceiling {}), discarding buffer",
                        dropped.len(),
                        self.accumulator.ceiling()
                    ),
                }
                debug!(
                    "Discarded buffer head: {}",
                    hex::encode(&dropped[..dropped.len().min(LOG_HEAD_BYTES)])
                );
                DecodeStatus::Overflow {
                    discarded: dropped.len(),
                }
            }
            (_, Some(e)) => {
                warn!("{} backend error: {}", self.backend.name(), e);
                DecodeStatus::Failed
            }
            (Disposition::Cleared(consumed), None) => {
                debug!(
                    "Decoded {} frame(s) from {} bytes",
                    frames.len(),
                    consumed.len()
                );
                DecodeStatus::Frames(frames.len())
            }
            (Disposition::Retained(buffered), None) => DecodeStatus::Incomplete {
                buffered: *buffered,
            },
        };

        frames
    }

    fn note_unavailable(&mut self, cause: Option<&BackendError>) {
        self.status = DecodeStatus::Unavailable;
        if self.warned_unavailable {
            return;
        }
        self.warned_unavailable = true;
        match cause {
            Some(e) => warn!("Decoding disabled: {}", e),
            None => warn!(
                "Decoding disabled: {} backend is unavailable",
                self.backend.name()
            ),
        }
    }

    /// Swaps in another backend. Buffered bytes are dropped because the new
    /// backend has no decoder state for them.
    pub fn set_backend(&mut self, backend: Box<dyn DecodeBackend>) {
        info!(
            "Switching decode backend {} -> {}",
            self.backend.name(),
            backend.name()
        );
        self.backend = backend;
        self.accumulator.reset();
        self.status = DecodeStatus::Idle;
        self.warned_unavailable = false;
    }

    pub fn status(&self) -> DecodeStatus {
        self.status
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_backend_available(&self) -> bool {
        !self.use_fallback_mode && self.backend.is_available()
    }

    pub fn is_fallback(&self) -> bool {
        self.use_fallback_mode
    }

    pub fn buffered_len(&self) -> usize {
        self.accumulator.len()
    }

    pub fn buffered(&self) -> &[u8] {
        self.accumulator.as_slice()
    }
}
