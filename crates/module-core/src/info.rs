//! Static module descriptors and out-of-band codec data.

use std::fmt;

use framewright_media_model::{Codec, MediaKind, StreamMask};
use serde::{Deserialize, Serialize};

/// What a module does in the export pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleClass {
    Encode,
    Multiplex,
}

impl ModuleClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Multiplex => "multiplex",
        }
    }
}

impl fmt::Display for ModuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor published by every module.
///
/// For encoders the first codec of `produces_*` is the default output
/// codec of that stream. For muxers only `accepts_*` is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub class: ModuleClass,
    /// Media kinds the module can serve.
    pub media: StreamMask,
    pub accepts_video: Vec<Codec>,
    pub accepts_audio: Vec<Codec>,
    pub produces_video: Vec<Codec>,
    pub produces_audio: Vec<Codec>,
}

impl ModuleInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        class: ModuleClass,
        media: StreamMask,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            class,
            media,
            accepts_video: Vec::new(),
            accepts_audio: Vec::new(),
            produces_video: Vec::new(),
            produces_audio: Vec::new(),
        }
    }

    pub fn accepting(mut self, video: &[Codec], audio: &[Codec]) -> Self {
        self.accepts_video = video.to_vec();
        self.accepts_audio = audio.to_vec();
        self
    }

    pub fn producing(mut self, video: &[Codec], audio: &[Codec]) -> Self {
        self.produces_video = video.to_vec();
        self.produces_audio = audio.to_vec();
        self
    }

    pub fn serves(&self, kind: MediaKind) -> bool {
        self.media.contains(kind.mask())
    }

    pub fn accepted(&self, kind: MediaKind) -> &[Codec] {
        match kind {
            MediaKind::Video => &self.accepts_video,
            MediaKind::Audio => &self.accepts_audio,
        }
    }

    pub fn produced(&self, kind: MediaKind) -> &[Codec] {
        match kind {
            MediaKind::Video => &self.produces_video,
            MediaKind::Audio => &self.produces_audio,
        }
    }

    /// Default output codec for `kind`, if the module produces any.
    pub fn default_output(&self, kind: MediaKind) -> Option<Codec> {
        self.produced(kind).first().copied()
    }
}

/// Out-of-band bytes emitted by an encoder at configuration time
/// (stream headers, codec private data).
///
/// The multiplexor re-delivers them at the start of every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraData {
    pub codec: Codec,
    pub data: Vec<u8>,
}

impl ExtraData {
    pub fn new(codec: Codec, data: Vec<u8>) -> Self {
        Self { codec, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.codec = Codec::Any;
        self.data.clear();
    }
}
