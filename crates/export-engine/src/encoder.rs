//! Encoder facade: one video and one audio encode module driven in step.

use std::sync::Arc;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{
    AudioFrame, FrameFlags, JobConfig, MediaKind, StreamMask, VideoFrame,
};
use framewright_module_core::{EncodeModule, ExtraData, ModuleFactory, ModuleInfo};
use tracing::{debug, error, info};

/// Result of encoding one frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOutcome {
    /// The video codec held the frame back; audio was not encoded and the
    /// input audio frame is now marked cloned.
    pub delayed: bool,
}

pub struct Encoder {
    factory: Arc<dyn ModuleFactory>,
    video: Option<Box<dyn EncodeModule>>,
    audio: Option<Box<dyn EncodeModule>>,
    processed: StreamMask,
}

impl Encoder {
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            factory,
            video: None,
            audio: None,
            processed: StreamMask::empty(),
        }
    }

    /// Instantiate both encode modules.
    pub fn setup(&mut self, video_name: &str, audio_name: &str) -> FramewrightResult<()> {
        let video = self.factory.new_encoder(video_name, MediaKind::Video)?;
        let audio = self.factory.new_encoder(audio_name, MediaKind::Audio)?;
        info!(video = video_name, audio = audio_name, "Encoder modules loaded");
        self.video = Some(video);
        self.audio = Some(audio);
        Ok(())
    }

    pub fn video_info(&self) -> Option<&ModuleInfo> {
        self.video.as_ref().map(|m| m.info())
    }

    pub fn audio_info(&self) -> Option<&ModuleInfo> {
        self.audio.as_ref().map(|m| m.info())
    }

    /// Configure video then audio.
    ///
    /// A video failure aborts before audio is touched. An audio failure
    /// leaves the configured video module in place.
    pub fn open(
        &mut self,
        job: &JobConfig,
        video_extra: &mut ExtraData,
        audio_extra: &mut ExtraData,
    ) -> FramewrightResult<()> {
        let (video, audio) = self.modules_mut()?;

        video
            .configure(&job.modules.video_options, job, Some(&mut *video_extra))
            .map_err(|e| {
                error!(module = %video.info().name, error = %e, "Video encoder configuration failed");
                FramewrightError::module_config(&video.info().name, e.to_string())
            })?;

        audio
            .configure(&job.modules.audio_options, job, Some(&mut *audio_extra))
            .map_err(|e| {
                error!(module = %audio.info().name, error = %e, "Audio encoder configuration failed");
                FramewrightError::module_config(&audio.info().name, e.to_string())
            })?;

        debug!(
            video_extra = video_extra.data.len(),
            audio_extra = audio_extra.data.len(),
            "Encoders configured"
        );
        Ok(())
    }

    /// Encode one frame pair, video first.
    pub fn process(
        &mut self,
        video_in: &mut VideoFrame,
        video_out: &mut VideoFrame,
        audio_in: &mut AudioFrame,
        audio_out: &mut AudioFrame,
    ) -> FramewrightResult<EncodeOutcome> {
        self.processed = StreamMask::empty();
        let (video, audio) = self.modules_mut()?;
        let mut errors = Vec::new();
        let mut processed = StreamMask::empty();

        video_in.flags = FrameFlags::empty();
        audio_in.flags = FrameFlags::empty();

        match video.encode_video(video_in, video_out) {
            Ok(()) => processed |= StreamMask::VIDEO,
            Err(e) => {
                error!(frame = video_in.id, error = %e, "Error encoding video frame");
                errors.push(FramewrightError::encode(MediaKind::Video.as_str(), e.to_string()));
            }
        }

        let delayed = video_in.flags.contains(FrameFlags::DELAYED);
        if delayed {
            video_in.flags.remove(FrameFlags::DELAYED);
            audio_in.flags.insert(FrameFlags::CLONED);
            info!(frame = video_in.id, "Delaying audio");
        } else {
            match audio.encode_audio(audio_in, audio_out) {
                Ok(()) => processed |= StreamMask::AUDIO,
                Err(e) => {
                    error!(frame = audio_in.id, error = %e, "Error encoding audio frame");
                    errors.push(FramewrightError::encode(MediaKind::Audio.as_str(), e.to_string()));
                }
            }
        }

        self.processed = processed;
        FramewrightError::aggregate(errors)?;
        Ok(EncodeOutcome { delayed })
    }

    /// Drain one buffered unit from each encoder.
    ///
    /// Returns which streams produced output. Call until the mask is empty.
    pub fn flush(
        &mut self,
        video_out: &mut VideoFrame,
        audio_out: &mut AudioFrame,
    ) -> FramewrightResult<StreamMask> {
        self.processed = StreamMask::empty();
        let (video, audio) = self.modules_mut()?;
        let mut errors = Vec::new();
        let mut processed = StreamMask::empty();
        let mut produced = StreamMask::empty();

        match video.flush_video(video_out) {
            Ok(returned) => {
                processed |= StreamMask::VIDEO;
                if returned {
                    produced |= StreamMask::VIDEO;
                }
            }
            Err(e) => {
                error!(error = %e, "Error flushing video encoder");
                errors.push(FramewrightError::flush(MediaKind::Video.as_str(), e.to_string()));
            }
        }

        match audio.flush_audio(audio_out) {
            Ok(returned) => {
                processed |= StreamMask::AUDIO;
                if returned {
                    produced |= StreamMask::AUDIO;
                }
            }
            Err(e) => {
                error!(error = %e, "Error flushing audio encoder");
                errors.push(FramewrightError::flush(MediaKind::Audio.as_str(), e.to_string()));
            }
        }

        self.processed = processed;
        FramewrightError::aggregate(errors)?;
        Ok(produced)
    }

    /// Stop both modules. Both stops are attempted; failures are combined.
    pub fn close(&mut self) -> FramewrightResult<()> {
        let mut errors = Vec::new();
        for (kind, module) in [
            (MediaKind::Video, self.video.as_mut()),
            (MediaKind::Audio, self.audio.as_mut()),
        ] {
            let Some(module) = module else { continue };
            if let Err(e) = module.stop() {
                error!(stream = %kind, module = %module.info().name, error = %e, "Failed to stop encoder");
                errors.push(FramewrightError::module_config(&module.info().name, e.to_string()));
            }
        }
        debug!("Encoders stopped");
        FramewrightError::aggregate(errors)
    }

    /// Release both modules.
    pub fn shutdown(&mut self) {
        self.video = None;
        self.audio = None;
        self.processed = StreamMask::empty();
    }

    /// Streams that succeeded in the last `process` or `flush` call.
    pub fn processed(&self) -> StreamMask {
        self.processed
    }

    fn modules_mut(
        &mut self,
    ) -> FramewrightResult<(&mut Box<dyn EncodeModule>, &mut Box<dyn EncodeModule>)> {
        match (self.video.as_mut(), self.audio.as_mut()) {
            (Some(video), Some(audio)) => Ok((video, audio)),
            _ => Err(FramewrightError::state("encoder modules are not set up")),
        }
    }
}
