//! Video/audio frames and their attribute set.

use std::fmt;

use bitflags::bitflags;
use framewright_common::error::{FramewrightError, FramewrightResult};

use crate::job::FrameSpecs;

bitflags! {
    /// Frame attributes set by upstream stages, codecs, and the export loop.
    ///
    /// The set is closed: raw bit patterns coming from outside the crate
    /// must go through [`FrameFlags::validate`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// Upstream dropped this frame; it carries no new content.
        const SKIPPED = 0x0001;
        /// This frame repeats its predecessor for this tick.
        const CLONED = 0x0002;
        /// This frame has already been emitted once as a clone.
        const WAS_CLONED = 0x0004;
        /// The codec accepted the frame but has not emitted output yet.
        const DELAYED = 0x0008;
        /// One-shot marker: no further frames follow.
        const END_OF_STREAM = 0x0010;
        /// The frame lies outside the requested export range.
        const OUT_OF_RANGE = 0x0020;
    }
}

/// Exclusive treatment of a stream's frame within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Normal,
    Skipped,
    Cloned,
}

impl FrameFlags {
    /// Convert raw bits, rejecting any bit outside the known set.
    pub fn validate(bits: u32) -> FramewrightResult<Self> {
        Self::from_bits(bits).ok_or_else(|| {
            FramewrightError::invalid_frame(format!(
                "unknown frame attribute bits {:#06x}",
                bits & !Self::all().bits()
            ))
        })
    }

    /// The single disposition these flags describe.
    ///
    /// A frame cannot be both skipped and cloned in the same tick.
    pub fn disposition(self) -> FramewrightResult<Disposition> {
        match (
            self.contains(Self::SKIPPED),
            self.contains(Self::CLONED),
        ) {
            (false, false) => Ok(Disposition::Normal),
            (true, false) => Ok(Disposition::Skipped),
            (false, true) => Ok(Disposition::Cloned),
            (true, true) => Err(FramewrightError::invalid_frame(
                "frame is marked both skipped and cloned",
            )),
        }
    }
}

/// Which kind of media a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// The single-stream mask for this kind.
    pub fn mask(self) -> StreamMask {
        match self {
            Self::Video => StreamMask::VIDEO,
            Self::Audio => StreamMask::AUDIO,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// A set of streams, used both for "which streams succeeded" results
    /// and for the media kinds a module serves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamMask: u8 {
        const VIDEO = 0x01;
        const AUDIO = 0x02;
    }
}

impl StreamMask {
    pub fn describe(self) -> &'static str {
        match (self.contains(Self::VIDEO), self.contains(Self::AUDIO)) {
            (true, true) => "video+audio",
            (true, false) => "video",
            (false, true) => "audio",
            (false, false) => "none",
        }
    }
}

/// A raw or encoded video frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoFrame {
    /// Logical tick identifier assigned upstream.
    pub id: i64,
    pub width: u32,
    pub height: u32,
    /// Set by encoders on frames that start a decodable group.
    pub keyframe: bool,
    pub flags: FrameFlags,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(id: i64, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_data(id: i64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(id, width, height)
        }
    }

    /// Allocate a scratch frame sized for the job's frame specs.
    pub fn scratch(specs: &FrameSpecs) -> Self {
        let mut frame = Self::new(0, specs.width, specs.height);
        frame.data.reserve(specs.video_buffer_size());
        frame
    }

    /// Clear content and attributes while keeping the allocation.
    pub fn reset(&mut self) {
        self.id = 0;
        self.keyframe = false;
        self.flags = FrameFlags::empty();
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A raw or encoded audio frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioFrame {
    /// Logical tick identifier assigned upstream.
    pub id: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub flags: FrameFlags,
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(id: i64, sample_rate: u32, channels: u16, bits: u16) -> Self {
        Self {
            id,
            sample_rate,
            channels,
            bits,
            ..Self::default()
        }
    }

    pub fn with_data(id: i64, sample_rate: u32, channels: u16, bits: u16, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(id, sample_rate, channels, bits)
        }
    }

    /// Allocate a scratch frame sized for the job's frame specs.
    pub fn scratch(specs: &FrameSpecs) -> Self {
        let mut frame = Self::new(0, specs.sample_rate, specs.channels, specs.bits);
        frame.data.reserve(specs.audio_buffer_size());
        frame
    }

    /// Clear content and attributes while keeping the allocation.
    pub fn reset(&mut self) {
        self.id = 0;
        self.flags = FrameFlags::empty();
        self.data.clear();
    }

    /// Number of whole sample frames in the payload.
    pub fn samples(&self) -> usize {
        let frame_bytes = self.channels as usize * (self.bits as usize / 8);
        if frame_bytes == 0 {
            return 0;
        }
        self.data.len() / frame_bytes
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One video frame and one audio frame sharing a logical tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramePair {
    pub video: VideoFrame,
    pub audio: AudioFrame,
}

impl FramePair {
    pub fn new(video: VideoFrame, audio: AudioFrame) -> Self {
        Self { video, audio }
    }

    /// Scratch pair sized for the job's frame specs.
    pub fn scratch(specs: &FrameSpecs) -> Self {
        Self {
            video: VideoFrame::scratch(specs),
            audio: AudioFrame::scratch(specs),
        }
    }

    pub fn reset(&mut self) {
        self.video.reset();
        self.audio.reset();
    }

    /// Whether either side carries the end-of-stream marker.
    pub fn is_end_of_stream(&self) -> bool {
        self.video.flags.contains(FrameFlags::END_OF_STREAM)
            || self.audio.flags.contains(FrameFlags::END_OF_STREAM)
    }

    /// Consume the end-of-stream marker on both sides.
    pub fn clear_end_of_stream(&mut self) {
        self.video.flags.remove(FrameFlags::END_OF_STREAM);
        self.audio.flags.remove(FrameFlags::END_OF_STREAM);
    }

    pub fn mark_out_of_range(&mut self) {
        self.video.flags.insert(FrameFlags::OUT_OF_RANGE);
        self.audio.flags.insert(FrameFlags::OUT_OF_RANGE);
    }
}
