use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;

use super::DecodeBackend;
use crate::config::SubprocessConfig;
use crate::error::BackendError;
use crate::frame::{DecodedFrame, BGR_CHANNELS};
use crate::h264::{ParameterSetCache, UnitAssembler};

const NAME: &str = "subprocess";

/// Pipes the buffered stream through an external `ffmpeg` and slices its raw
/// BGR24 output into frames.
///
/// The tool is treated as unreliable: a missing binary marks the backend
/// unavailable, a non-zero exit or short output is "no frame yet", and a hung
/// process is killed at the configured timeout. Each call spawns a fresh
/// process fed only with complete NAL units, so a slice still arriving is
/// never decoded half-read. The latest SPS/PPS are cached and re-sent with
/// buffers that start mid-stream.
///
/// Blocks the calling thread; do not call from inside an async runtime.
pub struct SubprocessBackend {
    program: String,
    width: usize,
    height: usize,
    timeout: Duration,
    runtime: Option<Runtime>,
    unavailable_reason: Option<String>,
    parameter_sets: ParameterSetCache,
    units: UnitAssembler,
}

impl SubprocessBackend {
    /// Runs `program -version` once so a missing tool is known up front.
    pub fn new(config: &SubprocessConfig) -> Self {
        let mut backend = Self {
            program: config.program.clone(),
            width: config.frame_width,
            height: config.frame_height,
            timeout: config.timeout(),
            runtime: None,
            unavailable_reason: None,
            parameter_sets: ParameterSetCache::new(),
            units: UnitAssembler::new(),
        };

        if let Err(reason) = check_tool(&config.program) {
            backend.unavailable_reason = Some(reason);
            return backend;
        }

        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => backend.runtime = Some(runtime),
            Err(e) => backend.unavailable_reason = Some(format!("failed to build IO runtime: {e}")),
        }
        backend
    }

    pub fn frame_size(&self) -> usize {
        self.width * self.height * BGR_CHANNELS
    }

    fn args(&self) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "h264",
            "-i",
            "pipe:0",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([format!("{}x{}", self.width, self.height), "pipe:1".to_string()])
        .collect()
    }

    fn mark_unavailable(&mut self, reason: String) -> BackendError {
        warn!("{} no longer usable: {}", self.program, reason);
        self.unavailable_reason = Some(reason.clone());
        self.runtime = None;
        BackendError::unavailable(NAME, reason)
    }
}

impl DecodeBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.unavailable_reason.is_none()
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        if let Some(reason) = &self.unavailable_reason {
            return Err(BackendError::unavailable(NAME, reason.clone()));
        }
        let Some(runtime) = &self.runtime else {
            return Err(BackendError::unavailable(NAME, "no IO runtime"));
        };

        self.units.update(buffer);
        self.parameter_sets.observe(self.units.as_slice());
        let complete = self.units.complete();
        if complete.is_empty() {
            debug!("No complete NAL unit yet, {} bytes pending", self.units.pending_len());
            return Ok(Vec::new());
        }
        let input = self.parameter_sets.prepend_if_missing(complete);
        let input_len = input.len();

        let started = Instant::now();
        let run = run_ffmpeg(&self.program, self.args(), &input);
        let timeout = self.timeout;
        // the timer must be created inside the runtime
        let result = runtime.block_on(async move { tokio::time::timeout(timeout, run).await });
        drop(input);
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(self.mark_unavailable(format!("{} not found", self.program)));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // kill_on_drop reaps the child with the dropped future
                return Err(BackendError::Timeout {
                    backend: NAME,
                    elapsed: started.elapsed(),
                });
            }
        };

        let frames = split_frames(&output, self.width, self.height);
        debug!(
            "{} turned {} input bytes into {} output bytes ({} frame(s)) in {:?}",
            self.program,
            input_len,
            output.len(),
            frames.len(),
            started.elapsed()
        );
        Ok(frames)
    }

    fn buffer_cleared(&mut self) {
        self.units.source_cleared();
    }

    fn buffer_discarded(&mut self) {
        self.units.reset();
    }
}

/// Runs `program -version`; `Err` carries a human-readable reason.
fn check_tool(program: &str) -> Result<(), String> {
    match Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => {
            info!("Found {} for subprocess decoding", program);
            Ok(())
        }
        Ok(status) => Err(format!("{program} -version exited with {status}")),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(format!("{program} not found on PATH")),
        Err(e) => Err(format!("failed to run {program}: {e}")),
    }
}

async fn run_ffmpeg(program: &str, args: Vec<String>, input: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::new(ErrorKind::Other, "child stdin not captured"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::new(ErrorKind::Other, "child stdout not captured"))?;

    let feed = async move {
        match stdin.write_all(input).await {
            // ffmpeg may bail out on garbage before reading everything
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
        // stdin dropped here so ffmpeg sees EOF
    };
    let mut output = Vec::new();
    let drain = stdout.read_to_end(&mut output);

    let (fed, drained) = tokio::join!(feed, drain);
    fed?;
    drained?;

    let status = child.wait().await?;
    if !status.success() {
        // typical for a buffer without a complete access unit
        debug!("{} exited with {}", program, status);
    }
    Ok(output)
}

/// Cuts raw BGR24 output into whole frames; a trailing partial frame is dropped.
fn split_frames(output: &[u8], width: usize, height: usize) -> Vec<DecodedFrame> {
    let frame_size = width * height * BGR_CHANNELS;
    if frame_size == 0 {
        return Vec::new();
    }
    output
        .chunks_exact(frame_size)
        .filter_map(|chunk| DecodedFrame::packed(chunk.to_vec(), width, height).ok())
        .collect()
}
