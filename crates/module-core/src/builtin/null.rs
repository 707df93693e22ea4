//! Modules that produce and store nothing.

use std::path::Path;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{AudioFrame, Codec, JobConfig, StreamMask, VideoFrame};
use tracing::debug;

use crate::info::{ExtraData, ModuleClass, ModuleInfo};
use crate::module::{EncodeModule, Module, MuxModule};
use crate::options::ModuleOptions;

pub(crate) const NAME: &str = "null";

/// Consumes every frame and emits an empty payload.
pub struct NullEncoder {
    info: ModuleInfo,
}

impl NullEncoder {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo::new(NAME, "discard all frames", ModuleClass::Encode, StreamMask::all())
                .accepting(&[Codec::Any], &[Codec::Any])
                .producing(&[Codec::Null], &[Codec::Null]),
        }
    }
}

impl Default for NullEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for NullEncoder {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        options: &str,
        _job: &JobConfig,
        extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        ModuleOptions::parse(NAME, options)?;
        if let Some(extra) = extra {
            extra.clear();
            extra.codec = Codec::Null;
        }
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        Ok(())
    }
}

impl EncodeModule for NullEncoder {
    fn encode_video(&mut self, input: &mut VideoFrame, output: &mut VideoFrame) -> FramewrightResult<()> {
        output.reset();
        output.id = input.id;
        Ok(())
    }

    fn encode_audio(&mut self, input: &mut AudioFrame, output: &mut AudioFrame) -> FramewrightResult<()> {
        output.reset();
        output.id = input.id;
        Ok(())
    }
}

/// Accepts every payload, stores none of it, and reports its size.
pub struct NullMuxer {
    info: ModuleInfo,
    open: bool,
}

impl NullMuxer {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo::new(NAME, "discard all payloads", ModuleClass::Multiplex, StreamMask::all())
                .accepting(&[Codec::Any], &[Codec::Any]),
            open: false,
        }
    }

    fn ensure_open(&self) -> FramewrightResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(FramewrightError::state("null multiplexor is not open"))
        }
    }
}

impl Default for NullMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for NullMuxer {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        options: &str,
        _job: &JobConfig,
        _extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        ModuleOptions::parse(NAME, options)?;
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        self.open = false;
        Ok(())
    }
}

impl MuxModule for NullMuxer {
    fn open(&mut self, sink: &Path, _extra: &[&ExtraData]) -> FramewrightResult<()> {
        debug!(sink = %sink.display(), "null multiplexor opened");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> FramewrightResult<()> {
        self.open = false;
        Ok(())
    }

    fn write_video(&mut self, frame: &VideoFrame) -> FramewrightResult<u64> {
        self.ensure_open()?;
        Ok(frame.len() as u64)
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> FramewrightResult<u64> {
        self.ensure_open()?;
        Ok(frame.len() as u64)
    }
}
