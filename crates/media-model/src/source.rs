//! Contracts for the export core's upstream collaborators.

use crate::frame::{AudioFrame, VideoFrame};

/// Pull-based supplier of raw frames.
///
/// `get_*` may block indefinitely until upstream stages produce the next
/// frame; `None` means the stream is exhausted. Every frame handed out
/// must come back through the matching `free_*` call.
pub trait FrameSource: Send + Sync {
    fn get_video_frame(&self) -> Option<VideoFrame>;

    fn get_audio_frame(&self) -> Option<AudioFrame>;

    fn free_video_frame(&self, frame: VideoFrame);

    fn free_audio_frame(&self, frame: AudioFrame);
}

/// Run status reported by the run control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Orderly stop requested.
    Stopped,
    /// Abnormal stop (signal, upstream failure).
    Interrupted,
}

impl RunStatus {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// External run control: cooperative pause/stop and progress sink.
pub trait RunControl: Send + Sync {
    fn status(&self) -> RunStatus;

    /// Whether a pause has been requested. Only used for reporting.
    fn is_paused(&self) -> bool {
        false
    }

    /// Cooperative pause point: block while the run is paused.
    /// Pausing does not change [`RunStatus`].
    fn pause(&self);

    /// Report one tick. `last = None` means the range is open-ended.
    fn progress(&self, encoding: bool, frame_id: i64, first: i64, last: Option<i64>);
}
