//! Export job configuration.
//!
//! A job is read-only for the whole duration of a run. It is normally
//! built by the caller (or deserialized from JSON) and validated once
//! before the export session is set up.

use std::path::{Path, PathBuf};

use framewright_common::config::ExportDefaults;
use framewright_common::error::{FramewrightError, FramewrightResult};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;

/// Upper bound for one raw video or audio frame buffer.
pub const MAX_FRAME_BYTES: usize = 512 << 20;

/// Top-level export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Geometry and rate of the frames fed to the export core.
    pub specs: FrameSpecs,

    /// Which codec/mux modules to use and their option strings.
    #[serde(default)]
    pub modules: ModuleSelection,

    /// Output path(s).
    pub output: OutputPaths,

    /// Frame range to export.
    #[serde(default)]
    pub range: FrameRange,

    /// Further ranges exported after `range` into the same outputs, in
    /// ascending order.
    #[serde(default)]
    pub extra_ranges: Vec<FrameRange>,

    /// Encode one tick every `frame_interval` ticks inside the range.
    #[serde(default = "default_frame_interval")]
    pub frame_interval: u32,

    /// Output rotation limits.
    #[serde(default)]
    pub rotation: RotationLimits,

    /// Requested output codecs; defaulted from the encoder modules.
    #[serde(default)]
    pub codecs: CodecSelection,

    /// Report progress once per processed tick.
    #[serde(default = "default_true")]
    pub progress_meter: bool,

    /// Reconcile frame ids against the global dropped-frame count.
    #[serde(default)]
    pub cluster_mode: bool,
}

/// Frame geometry and rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSpecs {
    pub width: u32,
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Bytes per pixel of the raw video payload.
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
}

/// Module names and options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub video_encoder: Option<String>,
    pub audio_encoder: Option<String>,
    #[serde(default)]
    pub video_options: String,
    #[serde(default)]
    pub audio_options: String,
    pub muxer: Option<String>,
    /// Auxiliary audio muxer. When present the multiplexor runs in
    /// dual mode with independent video and audio outputs.
    pub muxer_aux: Option<String>,
    #[serde(default)]
    pub mux_options: String,
}

/// Output sink paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Main output (video, or video+audio in mono mode).
    pub video: PathBuf,
    /// Audio output, required in dual mode.
    pub audio: Option<PathBuf>,
}

/// Half-open frame range `[first, last)`; `last = None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameRange {
    pub first: i64,
    pub last: Option<i64>,
}

/// Rotation limits; zero disables the corresponding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationLimits {
    #[serde(default)]
    pub frames: u32,
    #[serde(default)]
    pub megabytes: u32,
    /// Separate limits for the audio output in dual mode. When unset the
    /// audio output follows `frames`/`megabytes`.
    #[serde(default)]
    pub audio: Option<ChunkLimits>,
}

/// Per-output rotation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkLimits {
    #[serde(default)]
    pub frames: u32,
    #[serde(default)]
    pub megabytes: u32,
}

impl ChunkLimits {
    pub fn frames(frames: u32) -> Self {
        Self {
            frames,
            megabytes: 0,
        }
    }

    fn conflicting(self) -> bool {
        self.frames > 0 && self.megabytes > 0
    }
}

impl RotationLimits {
    pub fn frames(frames: u32) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn megabytes(megabytes: u32) -> Self {
        Self {
            megabytes,
            ..Self::default()
        }
    }

    /// Limits of the main output.
    pub fn main(&self) -> ChunkLimits {
        ChunkLimits {
            frames: self.frames,
            megabytes: self.megabytes,
        }
    }
}

/// Requested output codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecSelection {
    pub video: Option<Codec>,
    pub audio: Option<Codec>,
}

fn default_frame_interval() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_bytes_per_pixel() -> u32 {
    3
}

/// Whether `path` names a sink that discards everything.
pub fn is_null_sink(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new("/dev/null")
}

impl FrameRange {
    pub fn new(first: i64, last: Option<i64>) -> Self {
        Self { first, last }
    }

    /// Whether `id` lies in `[first, last)`.
    pub fn contains(&self, id: i64) -> bool {
        self.first <= id && self.last.map_or(true, |last| id < last)
    }

    /// Whether `id` is the exclusive upper bound.
    pub fn is_last(&self, id: i64) -> bool {
        self.last == Some(id)
    }
}

impl FrameSpecs {
    /// Byte size of one raw video frame.
    pub fn video_buffer_size(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.bytes_per_pixel as usize)
    }

    /// Byte size of the audio that accompanies one video frame.
    pub fn audio_buffer_size(&self) -> usize {
        if self.fps <= 0.0 {
            return 0;
        }
        let samples = (self.sample_rate as f64 / self.fps).ceil() as usize;
        samples
            .saturating_mul(self.channels as usize)
            .saturating_mul(self.bits as usize / 8)
    }
}

impl Default for FrameSpecs {
    fn default() -> Self {
        Self {
            width: 720,
            height: 576,
            fps: 25.0,
            bytes_per_pixel: 3,
            sample_rate: 48000,
            channels: 2,
            bits: 16,
        }
    }
}

impl JobConfig {
    /// A job writing to `output` with defaults everywhere else.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            specs: FrameSpecs::default(),
            modules: ModuleSelection::default(),
            output: OutputPaths {
                video: output.into(),
                audio: None,
            },
            range: FrameRange::default(),
            extra_ranges: Vec::new(),
            frame_interval: 1,
            rotation: RotationLimits::default(),
            codecs: CodecSelection::default(),
            progress_meter: true,
            cluster_mode: false,
        }
    }

    /// Parse a job from JSON and validate it.
    pub fn from_json(json: &str) -> FramewrightResult<Self> {
        let job: Self = serde_json::from_str(json)?;
        job.validate()?;
        Ok(job)
    }

    /// Load a job file from disk.
    pub fn load(path: &Path) -> FramewrightResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FramewrightError::config(format!("Failed to read job {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Check the job for internally inconsistent settings.
    pub fn validate(&self) -> FramewrightResult<()> {
        if self.frame_interval == 0 {
            return Err(FramewrightError::config("frame_interval must be at least 1"));
        }
        self.validate_ranges()?;
        self.validate_specs()?;
        let audio_conflict = self.rotation.audio.is_some_and(ChunkLimits::conflicting);
        if self.rotation.main().conflicting() || audio_conflict {
            return Err(FramewrightError::config(
                "rotation by frames and by megabytes are mutually exclusive",
            ));
        }
        if self.is_dual() && self.output.audio.is_none() {
            return Err(FramewrightError::config(
                "an auxiliary muxer requires an audio output path",
            ));
        }
        Ok(())
    }

    fn validate_ranges(&self) -> FramewrightResult<()> {
        let mut previous: Option<&FrameRange> = None;
        for range in self.ranges() {
            if let Some(last) = range.last {
                if last <= range.first {
                    return Err(FramewrightError::config(format!(
                        "empty frame range [{}, {last})",
                        range.first
                    )));
                }
            }
            if let Some(previous) = previous {
                match previous.last {
                    None => {
                        return Err(FramewrightError::config(
                            "only the final frame range may be open-ended",
                        ))
                    }
                    Some(end) if range.first < end => {
                        return Err(FramewrightError::config(format!(
                            "frame range starting at {} overlaps or precedes the range ending at {end}",
                            range.first
                        )))
                    }
                    Some(_) => {}
                }
            }
            previous = Some(range);
        }
        Ok(())
    }

    fn validate_specs(&self) -> FramewrightResult<()> {
        let specs = &self.specs;
        if specs.fps.is_nan() || specs.fps <= 0.0 {
            return Err(FramewrightError::config("fps must be positive"));
        }
        if specs.width == 0 || specs.height == 0 || specs.bytes_per_pixel == 0 {
            return Err(FramewrightError::config(format!(
                "invalid frame geometry {}x{} at {} bytes per pixel",
                specs.width, specs.height, specs.bytes_per_pixel
            )));
        }
        if specs.video_buffer_size() > MAX_FRAME_BYTES {
            return Err(FramewrightError::config(format!(
                "video frames of {}x{} exceed {MAX_FRAME_BYTES} bytes",
                specs.width, specs.height
            )));
        }
        if specs.audio_buffer_size() > MAX_FRAME_BYTES {
            return Err(FramewrightError::config(format!(
                "audio at {} Hz, {} channels, {} fps exceeds {MAX_FRAME_BYTES} bytes per frame",
                specs.sample_rate, specs.channels, specs.fps
            )));
        }
        Ok(())
    }

    /// Every range to export, in order.
    pub fn ranges(&self) -> impl Iterator<Item = &FrameRange> + '_ {
        std::iter::once(&self.range).chain(&self.extra_ranges)
    }

    /// Fill unset module names from the application defaults.
    pub fn apply_defaults(&mut self, defaults: &ExportDefaults) {
        let modules = &mut self.modules;
        modules
            .video_encoder
            .get_or_insert_with(|| defaults.video_encoder.clone());
        modules
            .audio_encoder
            .get_or_insert_with(|| defaults.audio_encoder.clone());
        modules
            .muxer
            .get_or_insert_with(|| defaults.muxer.clone());
    }

    /// Whether the multiplexor must run with separate audio output.
    pub fn is_dual(&self) -> bool {
        self.modules.muxer_aux.is_some()
    }

    pub fn with_range(mut self, first: i64, last: Option<i64>) -> Self {
        self.range = FrameRange::new(first, last);
        self
    }

    /// Append a range exported after the ones already set.
    pub fn then_range(mut self, first: i64, last: Option<i64>) -> Self {
        self.extra_ranges.push(FrameRange::new(first, last));
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.frame_interval = interval;
        self
    }
}
