//! Module capability traits.
//!
//! Each module instance serves a single run. The export core configures
//! it once, drives it from one thread, and stops it at the end.

use std::path::Path;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{AudioFrame, JobConfig, VideoFrame};

use crate::info::{ExtraData, ModuleInfo};

/// Behaviour shared by every module.
pub trait Module: Send {
    fn info(&self) -> &ModuleInfo;

    /// Apply the job and the module's option string.
    ///
    /// Encoders may fill `extra` with out-of-band stream data. Muxers are
    /// configured without it.
    fn configure(
        &mut self,
        options: &str,
        job: &JobConfig,
        extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()>;

    /// Release per-run state. A stopped module may be configured again.
    fn stop(&mut self) -> FramewrightResult<()>;
}

/// A codec stage.
///
/// An encoder that holds a frame back for reordering sets
/// [`FrameFlags::DELAYED`](framewright_media_model::FrameFlags::DELAYED)
/// on the input and leaves the output empty; the held frames come out
/// later through the `flush_*` calls.
pub trait EncodeModule: Module {
    fn encode_video(
        &mut self,
        _input: &mut VideoFrame,
        _output: &mut VideoFrame,
    ) -> FramewrightResult<()> {
        Err(FramewrightError::unsupported(format!(
            "{} does not encode video",
            self.info().name
        )))
    }

    fn encode_audio(
        &mut self,
        _input: &mut AudioFrame,
        _output: &mut AudioFrame,
    ) -> FramewrightResult<()> {
        Err(FramewrightError::unsupported(format!(
            "{} does not encode audio",
            self.info().name
        )))
    }

    /// Emit one buffered video frame. Returns `false` once nothing is left.
    fn flush_video(&mut self, _output: &mut VideoFrame) -> FramewrightResult<bool> {
        Ok(false)
    }

    /// Emit one buffered audio frame. Returns `false` once nothing is left.
    fn flush_audio(&mut self, _output: &mut AudioFrame) -> FramewrightResult<bool> {
        Ok(false)
    }
}

/// A container writer.
pub trait MuxModule: Module {
    /// Start a new output file at `sink`, writing `extra` first.
    fn open(&mut self, sink: &Path, extra: &[&ExtraData]) -> FramewrightResult<()>;

    fn close(&mut self) -> FramewrightResult<()>;

    /// Write one encoded video frame, returning the bytes written.
    fn write_video(&mut self, _frame: &VideoFrame) -> FramewrightResult<u64> {
        Err(FramewrightError::unsupported(format!(
            "{} does not multiplex video",
            self.info().name
        )))
    }

    /// Write one encoded audio frame, returning the bytes written.
    fn write_audio(&mut self, _frame: &AudioFrame) -> FramewrightResult<u64> {
        Err(FramewrightError::unsupported(format!(
            "{} does not multiplex audio",
            self.info().name
        )))
    }
}
