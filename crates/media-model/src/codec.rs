//! Codec tags exchanged between encoder and multiplexor modules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Codec identifier.
///
/// `Any` is a wildcard used by modules that accept every codec
/// (for example a muxer that stores opaque payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Any,
    /// Uncompressed video (packed planes).
    RawVideo,
    /// Uncompressed PCM audio.
    Pcm,
    /// Stream that carries no payload at all.
    Null,
    H264,
    Mpeg4,
    Mp3,
    Aac,
    Ac3,
    Vorbis,
}

impl Codec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::RawVideo => "raw_video",
            Self::Pcm => "pcm",
            Self::Null => "null",
            Self::H264 => "h264",
            Self::Mpeg4 => "mpeg4",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Vorbis => "vorbis",
        }
    }

    /// Whether `self`, as an accepted codec, admits `other`.
    pub fn accepts(self, other: Codec) -> bool {
        self == Codec::Any || other == Codec::Any || self == other
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
