use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reference ceiling: 1 MiB of undecoded stream before the buffer is dropped.
pub const DEFAULT_BUFFER_CEILING: usize = 1024 * 1024;

/// Which decode strategy backs the facade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// openh264 binding.
    #[default]
    Native,
    /// OpenCV VideoCapture over a temporary file.
    #[serde(alias = "vision", alias = "opencv")]
    #[value(alias = "vision", alias = "opencv")]
    VisionLibrary,
    /// External ffmpeg process.
    #[serde(alias = "ffmpeg")]
    #[value(alias = "ffmpeg")]
    Subprocess,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::VisionLibrary => "vision-library",
            Self::Subprocess => "subprocess",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the ffmpeg subprocess backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubprocessConfig {
    /// Executable name or path.
    pub program: String,
    /// Upper bound for one spawn/feed/read cycle.
    pub timeout_ms: u64,
    /// Raw output is unframed, so the frame size has to be fixed up front.
    pub frame_width: usize,
    pub frame_height: usize,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout_ms: 2_000,
            frame_width: crate::frame::DEFAULT_WIDTH,
            frame_height: crate::frame::DEFAULT_HEIGHT,
        }
    }
}

impl SubprocessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Decoder configuration, usually loaded from `config.json`.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub backend: BackendKind,
    /// Skip decoding entirely and always hand back no frames.
    pub use_fallback_mode: bool,
    pub buffer_ceiling_bytes: usize,
    pub subprocess: SubprocessConfig,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            use_fallback_mode: false,
            buffer_ceiling_bytes: DEFAULT_BUFFER_CEILING,
            subprocess: SubprocessConfig::default(),
        }
    }
}

impl DecoderConfig {
    /// Reads the decoder configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path to the JSON file (e.g. "config.json").
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration, or a [`ConfigError`] if reading,
    /// parsing, or validation fails.
    pub fn from_json_file(file_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json_str = fs::read_to_string(file_path)?;
        Self::from_json_str(&json_str)
    }

    pub fn from_json_str(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_ceiling_bytes == 0 {
            return Err(ConfigError::Invalid(
                "buffer_ceiling_bytes must be positive".into(),
            ));
        }
        let sub = &self.subprocess;
        if sub.frame_width == 0 || sub.frame_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "subprocess frame size must be positive, got {}x{}",
                sub.frame_width, sub.frame_height
            )));
        }
        if sub.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "subprocess timeout_ms must be positive".into(),
            ));
        }
        if sub.program.trim().is_empty() {
            return Err(ConfigError::Invalid("subprocess program is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config = DecoderConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DecoderConfig::default());
        assert_eq!(config.buffer_ceiling_bytes, 1_048_576);
        assert!(!config.use_fallback_mode);
    }

    #[test]
    fn backend_names_and_aliases() {
        for (name, kind) in [
            ("native", BackendKind::Native),
            ("vision-library", BackendKind::VisionLibrary),
            ("opencv", BackendKind::VisionLibrary),
            ("subprocess", BackendKind::Subprocess),
            ("ffmpeg", BackendKind::Subprocess),
        ] {
            let json = format!(r#"{{"backend": "{name}"}}"#);
            assert_eq!(DecoderConfig::from_json_str(&json).unwrap().backend, kind);
        }
        assert!(DecoderConfig::from_json_str(r#"{"backend": "gstreamer"}"#).is_err());
    }

    #[test]
    fn rejects_zero_ceiling() {
        let err = DecoderConfig::from_json_str(r#"{"buffer_ceiling_bytes": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reads_file_with_nested_subprocess_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "backend": "subprocess",
                "use_fallback_mode": true,
                "buffer_ceiling_bytes": 65536,
                "subprocess": {{ "program": "/usr/bin/ffmpeg", "timeout_ms": 500 }}
            }}"#
        )
        .unwrap();

        let config = DecoderConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::Subprocess);
        assert!(config.use_fallback_mode);
        assert_eq!(config.buffer_ceiling_bytes, 65536);
        assert_eq!(config.subprocess.program, "/usr/bin/ffmpeg");
        assert_eq!(config.subprocess.timeout(), Duration::from_millis(500));
        assert_eq!(config.subprocess.frame_width, 960);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = DecoderConfig::from_json_file("/nonexistent/tello/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
