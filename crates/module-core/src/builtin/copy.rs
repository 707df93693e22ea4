//! Pass-through encoder.
//!
//! Options:
//! - `delay=N`: hold back N video frames, as a codec with B-frame
//!   reordering would. Held frames are emitted by `flush_video`.
//! - `keyint=N`: mark every Nth emitted video frame as a keyframe
//!   (default 1, every frame).

use std::collections::VecDeque;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{AudioFrame, Codec, FrameFlags, JobConfig, StreamMask, VideoFrame};
use tracing::{debug, warn};

use crate::info::{ExtraData, ModuleClass, ModuleInfo};
use crate::module::{EncodeModule, Module};
use crate::options::ModuleOptions;

pub(crate) const NAME: &str = "copy";

const KNOWN_OPTIONS: &[&str] = &["delay", "keyint"];

pub struct CopyEncoder {
    info: ModuleInfo,
    delay: usize,
    keyint: u64,
    emitted: u64,
    held: VecDeque<VideoFrame>,
}

impl CopyEncoder {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo::new(
                NAME,
                "copy raw payloads unchanged",
                ModuleClass::Encode,
                StreamMask::all(),
            )
            .accepting(&[Codec::RawVideo], &[Codec::Pcm])
            .producing(&[Codec::RawVideo], &[Codec::Pcm]),
            delay: 0,
            keyint: 1,
            emitted: 0,
            held: VecDeque::new(),
        }
    }

    /// Frames currently held back.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    fn emit(&mut self, source: &VideoFrame, output: &mut VideoFrame) {
        output.id = source.id;
        output.width = source.width;
        output.height = source.height;
        output.keyframe = self.emitted % self.keyint == 0;
        output.data.extend_from_slice(&source.data);
        self.emitted += 1;
    }
}

impl Default for CopyEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for CopyEncoder {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        options: &str,
        _job: &JobConfig,
        extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        let opts = ModuleOptions::parse(NAME, options)?;
        for key in opts.unknown_keys(KNOWN_OPTIONS) {
            warn!(module = NAME, option = key, "Ignoring unknown option");
        }

        self.delay = opts.value("delay")?.unwrap_or(0);
        self.keyint = opts.value("keyint")?.unwrap_or(1);
        if self.keyint == 0 {
            return Err(FramewrightError::module_config(NAME, "keyint must be at least 1"));
        }
        self.emitted = 0;
        self.held.clear();

        if let Some(extra) = extra {
            extra.clear();
        }
        debug!(delay = self.delay, keyint = self.keyint, "copy encoder configured");
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        if !self.held.is_empty() {
            warn!(frames = self.held.len(), "copy encoder stopped with unflushed frames");
        }
        self.held.clear();
        Ok(())
    }
}

impl EncodeModule for CopyEncoder {
    fn encode_video(&mut self, input: &mut VideoFrame, output: &mut VideoFrame) -> FramewrightResult<()> {
        output.reset();
        if self.delay == 0 {
            self.emit(input, output);
            return Ok(());
        }

        self.held.push_back(input.clone());
        if self.held.len() > self.delay {
            if let Some(frame) = self.held.pop_front() {
                self.emit(&frame, output);
            }
        } else {
            input.flags.insert(FrameFlags::DELAYED);
        }
        Ok(())
    }

    fn encode_audio(&mut self, input: &mut AudioFrame, output: &mut AudioFrame) -> FramewrightResult<()> {
        output.reset();
        output.id = input.id;
        output.sample_rate = input.sample_rate;
        output.channels = input.channels;
        output.bits = input.bits;
        output.data.extend_from_slice(&input.data);
        Ok(())
    }

    fn flush_video(&mut self, output: &mut VideoFrame) -> FramewrightResult<bool> {
        output.reset();
        match self.held.pop_front() {
            Some(frame) => {
                self.emit(&frame, output);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
