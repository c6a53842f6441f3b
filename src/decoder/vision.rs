use std::io::Write;

use log::{debug, warn};
use opencv::{
    core::{Mat, CV_8UC3},
    prelude::*,
    videoio,
};

use super::DecodeBackend;
use crate::error::BackendError;
use crate::frame::{DecodedFrame, BGR_CHANNELS};
use crate::h264::{ParameterSetCache, UnitAssembler};

const NAME: &str = "vision-library";

/// Best-effort decode through OpenCV's `VideoCapture`.
///
/// OpenCV only decodes what it can open, so the buffer is written to a
/// temporary `.h264` file and read back through whichever videoio backend
/// claims it. Only complete NAL units are written. Without container framing
/// this frequently yields nothing, and that is reported as no frames; nothing
/// is ever synthesised in its place.
pub struct VisionBackend {
    parameter_sets: ParameterSetCache,
    units: UnitAssembler,
}

impl VisionBackend {
    pub fn new() -> Self {
        Self {
            parameter_sets: ParameterSetCache::new(),
            units: UnitAssembler::new(),
        }
    }
}

impl Default for VisionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBackend for VisionBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn try_decode(&mut self, buffer: &[u8]) -> Result<Vec<DecodedFrame>, BackendError> {
        self.units.update(buffer);
        self.parameter_sets.observe(self.units.as_slice());
        let complete = self.units.complete();
        if complete.is_empty() {
            return Ok(Vec::new());
        }
        let input = self.parameter_sets.prepend_if_missing(complete);

        let mut file = tempfile::Builder::new()
            .prefix("tello-")
            .suffix(".h264")
            .tempfile()?;
        file.write_all(&input)?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        let mut capture = videoio::VideoCapture::from_file(&path, videoio::CAP_ANY)
            .map_err(|e| BackendError::failed(NAME, e))?;
        if !capture.is_opened().map_err(|e| BackendError::failed(NAME, e))? {
            debug!("OpenCV could not open {} buffered bytes as H.264", input.len());
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        loop {
            let mut mat = Mat::default();
            match capture.read(&mut mat) {
                Ok(true) if !mat.empty() => match mat_to_frame(&mat) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => warn!("Skipping OpenCV frame: {}", e),
                },
                Ok(_) => break,
                Err(e) => {
                    debug!("OpenCV read stopped: {}", e);
                    break;
                }
            }
        }
        // release before the temp file is deleted
        if let Err(e) = capture.release() {
            debug!("OpenCV release failed: {}", e);
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

fn mat_to_frame(mat: &Mat) -> Result<DecodedFrame, BackendError> {
    if mat.typ() != CV_8UC3 {
        return Err(BackendError::failed(
            NAME,
            format!("unexpected Mat type {}", mat.typ()),
        ));
    }
    let width = mat.cols() as usize;
    let height = mat.rows() as usize;

    let continuous;
    let source = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone().map_err(|e| BackendError::failed(NAME, e))?;
        &continuous
    };
    let data = source.data_bytes().map_err(|e| BackendError::failed(NAME, e))?;
    let len = width * height * BGR_CHANNELS;
    if data.len() < len {
        return Err(BackendError::failed(
            NAME,
            format!("Mat holds {} bytes, expected {}", data.len(), len),
        ));
    }

    DecodedFrame::packed(data[..len].to_vec(), width, height)
        .map_err(|e| BackendError::failed(NAME, e))
}

/// Copies a frame into a `Mat` for display.
pub fn frame_to_mat(frame: &DecodedFrame) -> opencv::Result<Mat> {
    let mut mat = unsafe {
        // Safety: every byte is overwritten below before the Mat is read.
        Mat::new_rows_cols(frame.height() as i32, frame.width() as i32, CV_8UC3)?
    };
    let data = mat.data_bytes_mut()?;
    let row_len = frame.width() * BGR_CHANNELS;
    for (y, dst) in data.chunks_exact_mut(row_len).enumerate() {
        dst.copy_from_slice(frame.row(y));
    }
    Ok(mat)
}
