//! Decode pipeline for the Tello's H.264 video stream.
//!
//! Raw UDP payloads go into a [`DecoderFacade`], which buffers them and asks a
//! pluggable [`DecodeBackend`] for whole BGR frames. Decoding degrades to "no
//! frames" instead of failing, so a capture loop keeps running when a backend
//! is missing or the stream is damaged.

pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod h264;
pub mod network;
pub mod pipeline;

pub use config::{BackendKind, DecoderConfig};
pub use decoder::{DecodeBackend, DecodeStatus, DecoderFacade};
pub use error::{BackendError, ConfigError, FrameError};
pub use frame::{make_test_frame, DecodedFrame};
