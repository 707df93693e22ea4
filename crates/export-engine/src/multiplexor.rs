//! Multiplexor facade: container writers plus output rotation.
//!
//! In mono mode one module receives both streams and a video+audio pair
//! is a single write-unit for rotation purposes. In dual mode video and
//! audio go to independent modules, each with its own rotation context.

use std::path::Path;
use std::sync::Arc;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{
    AudioFrame, FramePair, JobConfig, MediaKind, StreamMask, VideoFrame,
};
use framewright_module_core::{ExtraData, ModuleFactory, ModuleInfo, MuxModule};
use tracing::{debug, error, info, warn};

use crate::rotation::{RotationContext, RotationPolicy};

/// One container writer and the rotation state of its output.
struct MuxStream {
    tag: &'static str,
    module: Box<dyn MuxModule>,
    rotor: Option<RotationContext>,
    /// The current chunk is full; the next rotatable write starts a new one.
    full: bool,
}

impl MuxStream {
    fn new(tag: &'static str, module: Box<dyn MuxModule>) -> Self {
        Self {
            tag,
            module,
            rotor: None,
            full: false,
        }
    }

    fn open(&mut self, base: &Path, policy: RotationPolicy, extra: &[&ExtraData]) -> FramewrightResult<()> {
        let mut rotor = RotationContext::new(base, policy);
        let name = rotor.output_name().to_path_buf();
        self.module.open(&name, extra).map_err(|e| {
            error!(stream = self.tag, path = %name.display(), error = %e, "Multiplexor open failed");
            FramewrightError::mux(self.tag, format!("open {} failed: {e}", name.display()))
        })?;
        debug!(stream = self.tag, path = %name.display(), policy = ?rotor.policy(), "Output opened");
        self.rotor = Some(rotor);
        self.full = false;
        Ok(())
    }

    fn close(&mut self) -> FramewrightResult<()> {
        if self.rotor.is_none() {
            return Ok(());
        }
        self.rotor = None;
        self.full = false;
        self.module.close().map_err(|e| {
            error!(stream = self.tag, error = %e, "Multiplexor close failed");
            FramewrightError::mux(self.tag, format!("close failed: {e}"))
        })
    }

    fn rotor_mut(&mut self) -> FramewrightResult<&mut RotationContext> {
        self.rotor
            .as_mut()
            .ok_or_else(|| FramewrightError::state(format!("{} output is not open", self.tag)))
    }

    fn write_video(&mut self, frame: &VideoFrame) -> FramewrightResult<u64> {
        self.rotor_mut()?;
        self.module.write_video(frame).map_err(|e| {
            error!(frame = frame.id, error = %e, "Error multiplexing video frame");
            FramewrightError::mux(MediaKind::Video.as_str(), e.to_string())
        })
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> FramewrightResult<u64> {
        self.rotor_mut()?;
        self.module.write_audio(frame).map_err(|e| {
            error!(frame = frame.id, error = %e, "Error multiplexing audio frame");
            FramewrightError::mux(MediaKind::Audio.as_str(), e.to_string())
        })
    }

    /// Account one write-unit of `bytes` against the current chunk.
    fn record(&mut self, bytes: u64) -> FramewrightResult<()> {
        self.full = self.rotor_mut()?.record(1, bytes);
        Ok(())
    }

    /// Start the next chunk if the current one is full and rotation is allowed.
    fn rotate_if_full(&mut self, allow_rotate: bool, extra: &[&ExtraData]) -> FramewrightResult<()> {
        if self.full && allow_rotate {
            self.rotate(extra)?;
        }
        Ok(())
    }

    /// Close the current chunk and open the next one.
    fn rotate(&mut self, extra: &[&ExtraData]) -> FramewrightResult<()> {
        let rotor = self
            .rotor
            .as_mut()
            .ok_or_else(|| FramewrightError::state(format!("{} output is not open", self.tag)))?;

        let previous = rotor.current().to_path_buf();
        self.module.close().map_err(|e| {
            error!(stream = self.tag, path = %previous.display(), error = %e, "Closing chunk failed");
            FramewrightError::rotation(&previous, format!("close failed: {e}"))
        })?;

        let next = rotor.output_name().to_path_buf();
        info!(stream = self.tag, path = %next.display(), "Rotating output stream");
        self.full = false;
        self.module.open(&next, extra).map_err(|e| {
            error!(stream = self.tag, path = %next.display(), error = %e, "Opening chunk failed");
            FramewrightError::rotation(&next, format!("open failed: {e}"))
        })
    }

    fn current(&self) -> Option<&Path> {
        self.rotor.as_ref().map(|r| r.current())
    }
}

enum MuxMode {
    Mono(MuxStream),
    Dual { video: MuxStream, audio: MuxStream },
}

impl MuxMode {
    fn streams_mut(&mut self) -> Vec<&mut MuxStream> {
        match self {
            Self::Mono(main) => vec![main],
            Self::Dual { video, audio } => vec![video, audio],
        }
    }
}

pub struct Multiplexor {
    factory: Arc<dyn ModuleFactory>,
    mode: Option<MuxMode>,
    policy: RotationPolicy,
    audio_policy: Option<RotationPolicy>,
    video_extra: ExtraData,
    audio_extra: ExtraData,
    open: bool,
    processed: StreamMask,
}

impl Multiplexor {
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            factory,
            mode: None,
            policy: RotationPolicy::Never,
            audio_policy: None,
            video_extra: ExtraData::default(),
            audio_extra: ExtraData::default(),
            open: false,
            processed: StreamMask::empty(),
        }
    }

    /// Instantiate and configure the muxer modules.
    ///
    /// Naming an auxiliary module selects dual mode: `main` then serves
    /// video only and `aux` serves audio.
    pub fn setup(&mut self, main: &str, aux: Option<&str>, job: &JobConfig) -> FramewrightResult<()> {
        let main_media = if aux.is_some() {
            StreamMask::VIDEO
        } else {
            StreamMask::all()
        };
        let main_module = self.configured(main, main_media, job)?;

        let mode = match aux {
            None => MuxMode::Mono(MuxStream::new("main", main_module)),
            Some(aux) => {
                let aux_module = self.configured(aux, StreamMask::AUDIO, job)?;
                MuxMode::Dual {
                    video: MuxStream::new("video", main_module),
                    audio: MuxStream::new("audio", aux_module),
                }
            }
        };
        info!(main, aux = ?aux, dual = aux.is_some(), "Multiplexor set up");
        self.mode = Some(mode);
        Ok(())
    }

    fn configured(&self, name: &str, media: StreamMask, job: &JobConfig) -> FramewrightResult<Box<dyn MuxModule>> {
        let mut module = self.factory.new_muxer(name, media)?;
        module
            .configure(&job.modules.mux_options, job, None)
            .map_err(|e| {
                error!(module = name, error = %e, "Multiplexor configuration failed");
                FramewrightError::module_config(name, e.to_string())
            })?;
        Ok(module)
    }

    pub fn is_dual(&self) -> bool {
        matches!(self.mode, Some(MuxMode::Dual { .. }))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Descriptor of the module receiving `kind`.
    pub fn info(&self, kind: MediaKind) -> Option<&ModuleInfo> {
        match (&self.mode, kind) {
            (Some(MuxMode::Mono(main)), _) => Some(main.module.info()),
            (Some(MuxMode::Dual { video, .. }), MediaKind::Video) => Some(video.module.info()),
            (Some(MuxMode::Dual { audio, .. }), MediaKind::Audio) => Some(audio.module.info()),
            (None, _) => None,
        }
    }

    /// Rotate every output after `frames` write-units. Zero is ignored.
    pub fn limit_frames(&mut self, frames: u32) -> FramewrightResult<()> {
        self.set_policy(RotationPolicy::frames(frames))
    }

    /// Rotate every output after `megabytes` MiB. Zero is ignored.
    pub fn limit_megabytes(&mut self, megabytes: u32) -> FramewrightResult<()> {
        self.set_policy(RotationPolicy::megabytes(megabytes))
    }

    fn set_policy(&mut self, policy: RotationPolicy) -> FramewrightResult<()> {
        if !policy.rotates() {
            return Ok(());
        }
        if self.open {
            return Err(FramewrightError::state(
                "rotation limits must be set before the multiplexor is opened",
            ));
        }
        self.policy = policy;
        Ok(())
    }

    /// Give the audio output of a dual multiplexor its own policy.
    /// `Never` is honoured here: the audio output then stays in one file.
    pub fn limit_audio(&mut self, policy: RotationPolicy) -> FramewrightResult<()> {
        if self.open {
            return Err(FramewrightError::state(
                "rotation limits must be set before the multiplexor is opened",
            ));
        }
        if !self.is_dual() {
            warn!(?policy, "Audio rotation limit ignored without an auxiliary multiplexor");
            return Ok(());
        }
        self.audio_policy = Some(policy);
        Ok(())
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Policy applied to the audio output.
    pub fn audio_policy(&self) -> RotationPolicy {
        self.audio_policy.unwrap_or(self.policy)
    }

    /// Open the outputs. `extra` is written at the start of every chunk.
    pub fn open(
        &mut self,
        video_sink: &Path,
        audio_sink: Option<&Path>,
        video_extra: &ExtraData,
        audio_extra: &ExtraData,
    ) -> FramewrightResult<()> {
        if self.open {
            return Err(FramewrightError::state("multiplexor is already open"));
        }
        self.video_extra = video_extra.clone();
        self.audio_extra = audio_extra.clone();

        let policy = self.policy;
        let audio_policy = self.audio_policy();
        match &mut self.mode {
            None => return Err(FramewrightError::state("multiplexor is not set up")),
            Some(MuxMode::Mono(main)) => {
                main.open(video_sink, policy, &[&self.video_extra, &self.audio_extra])?;
            }
            Some(MuxMode::Dual { video, audio }) => {
                let audio_sink = audio_sink.ok_or_else(|| {
                    FramewrightError::config("dual multiplexing requires an audio output path")
                })?;
                video.open(video_sink, policy, &[&self.video_extra])?;
                if let Err(e) = audio.open(audio_sink, audio_policy, &[&self.audio_extra]) {
                    if let Err(close_err) = video.close() {
                        warn!(error = %close_err, "Failed to close video output after audio open failure");
                    }
                    return Err(e);
                }
            }
        }
        self.open = true;
        Ok(())
    }

    /// Write encoded frames. Either side may be absent.
    ///
    /// A write that fills a chunk marks it full. The next write with
    /// `allow_rotate` set closes it and opens the next chunk before
    /// writing, so a chunk never ends up empty.
    pub fn write(
        &mut self,
        video: Option<&VideoFrame>,
        audio: Option<&AudioFrame>,
        allow_rotate: bool,
    ) -> FramewrightResult<()> {
        self.processed = StreamMask::empty();
        match &mut self.mode {
            None => Err(FramewrightError::state("multiplexor is not set up")),
            Some(MuxMode::Mono(main)) => {
                if video.is_none() && audio.is_none() {
                    return Ok(());
                }
                main.rotate_if_full(allow_rotate, &[&self.video_extra, &self.audio_extra])?;
                let mut bytes = 0;
                if let Some(frame) = video {
                    bytes += main.write_video(frame)?;
                    self.processed |= StreamMask::VIDEO;
                }
                if let Some(frame) = audio {
                    bytes += main.write_audio(frame)?;
                    self.processed |= StreamMask::AUDIO;
                }
                main.record(bytes)
            }
            Some(MuxMode::Dual {
                video: video_out,
                audio: audio_out,
            }) => {
                if let Some(frame) = video {
                    video_out.rotate_if_full(allow_rotate, &[&self.video_extra])?;
                    let bytes = video_out.write_video(frame)?;
                    self.processed |= StreamMask::VIDEO;
                    video_out.record(bytes)?;
                }
                if let Some(frame) = audio {
                    audio_out.rotate_if_full(allow_rotate, &[&self.audio_extra])?;
                    let bytes = audio_out.write_audio(frame)?;
                    self.processed |= StreamMask::AUDIO;
                    audio_out.record(bytes)?;
                }
                Ok(())
            }
        }
    }

    /// Write a freshly encoded pair, rotating when a chunk is full.
    pub fn export(&mut self, pair: &FramePair) -> FramewrightResult<()> {
        self.write(Some(&pair.video), Some(&pair.audio), true)
    }

    /// Streams written by the last `write` call.
    pub fn processed(&self) -> StreamMask {
        self.processed
    }

    /// Path of the chunk currently receiving `kind`.
    pub fn output_path(&self, kind: MediaKind) -> Option<&Path> {
        match (&self.mode, kind) {
            (Some(MuxMode::Mono(main)), _) => main.current(),
            (Some(MuxMode::Dual { video, .. }), MediaKind::Video) => video.current(),
            (Some(MuxMode::Dual { audio, .. }), MediaKind::Audio) => audio.current(),
            (None, _) => None,
        }
    }

    /// Close every open output. All outputs are attempted.
    pub fn close(&mut self) -> FramewrightResult<()> {
        let mut errors = Vec::new();
        if let Some(mode) = self.mode.as_mut() {
            for stream in mode.streams_mut() {
                if let Err(e) = stream.close() {
                    errors.push(e);
                }
            }
        }
        self.open = false;
        debug!("Multiplexor closed");
        FramewrightError::aggregate(errors)
    }

    /// Stop and release the modules, closing outputs first if needed.
    pub fn shutdown(&mut self) -> FramewrightResult<()> {
        let mut errors = Vec::new();
        if self.open {
            if let Err(e) = self.close() {
                errors.push(e);
            }
        }
        if let Some(mut mode) = self.mode.take() {
            for stream in mode.streams_mut() {
                if let Err(e) = stream.module.stop() {
                    error!(stream = stream.tag, error = %e, "Failed to stop multiplexor");
                    errors.push(FramewrightError::module_config(&stream.module.info().name, e.to_string()));
                }
            }
        }
        self.processed = StreamMask::empty();
        FramewrightError::aggregate(errors)
    }
}
