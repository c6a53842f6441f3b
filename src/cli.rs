use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use tello_video::config::{BackendKind, DecoderConfig};
use tello_video::error::ConfigError;
use tello_video::network::TELLO_VIDEO_PORT;

/// Receive and decode the Tello H.264 video stream.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// JSON decoder configuration; flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local address the video socket binds to.
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], TELLO_VIDEO_PORT)))]
    pub bind: SocketAddr,

    /// Decode backend.
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Disable decoding; every packet yields no frames.
    #[arg(long)]
    pub fallback: bool,

    /// Packet buffer ceiling in bytes.
    #[arg(long)]
    pub buffer_ceiling: Option<usize>,

    /// Show a synthetic gradient frame instead of listening on the socket.
    #[arg(long)]
    pub test_frame: bool,

    /// Do not open a preview window even when built with OpenCV.
    #[arg(long)]
    pub headless: bool,
}

impl Args {
    /// Loads the config file (if any) and applies the command-line overrides.
    pub fn decoder_config(&self) -> Result<DecoderConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => DecoderConfig::from_json_file(path)?,
            None => DecoderConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.fallback {
            config.use_fallback_mode = true;
        }
        if let Some(ceiling) = self.buffer_ceiling {
            config.buffer_ceiling_bytes = ceiling;
        }
        config.validate()?;
        Ok(config)
    }
}
