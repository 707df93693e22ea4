//! Channel-backed [`FrameSource`] for feeding an export from another thread.
//!
//! The producer pushes frames through a bounded channel; released frames
//! travel back through a return channel so their buffers can be reused.
//! Dropping the [`FrameFeeder`] ends the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Mutex;

use framewright_media_model::{AudioFrame, FrameSource, VideoFrame};

/// Producer half.
pub struct FrameFeeder {
    video: SyncSender<VideoFrame>,
    audio: SyncSender<AudioFrame>,
    recycled_video: Receiver<VideoFrame>,
    recycled_audio: Receiver<AudioFrame>,
}

/// Consumer half, handed to the export session.
pub struct ChannelFrameSource {
    video: Mutex<Receiver<VideoFrame>>,
    audio: Mutex<Receiver<AudioFrame>>,
    recycle_video: Mutex<Sender<VideoFrame>>,
    recycle_audio: Mutex<Sender<AudioFrame>>,
    released: AtomicU64,
}

/// Create a connected feeder/source pair holding at most `capacity`
/// in-flight frames per stream.
pub fn frame_channel(capacity: usize) -> (FrameFeeder, ChannelFrameSource) {
    let (video_tx, video_rx) = mpsc::sync_channel(capacity);
    let (audio_tx, audio_rx) = mpsc::sync_channel(capacity);
    let (recycle_video_tx, recycle_video_rx) = mpsc::channel();
    let (recycle_audio_tx, recycle_audio_rx) = mpsc::channel();

    let feeder = FrameFeeder {
        video: video_tx,
        audio: audio_tx,
        recycled_video: recycle_video_rx,
        recycled_audio: recycle_audio_rx,
    };
    let source = ChannelFrameSource {
        video: Mutex::new(video_rx),
        audio: Mutex::new(audio_rx),
        recycle_video: Mutex::new(recycle_video_tx),
        recycle_audio: Mutex::new(recycle_audio_tx),
        released: AtomicU64::new(0),
    };
    (feeder, source)
}

impl FrameFeeder {
    /// Queue one frame pair, blocking while the channel is full.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn push(&self, video: VideoFrame, audio: AudioFrame) -> bool {
        self.video.send(video).is_ok() && self.audio.send(audio).is_ok()
    }

    /// A released video frame whose buffer can be reused.
    pub fn recycled_video(&self) -> Option<VideoFrame> {
        self.recycled_video.try_recv().ok()
    }

    /// A released audio frame whose buffer can be reused.
    pub fn recycled_audio(&self) -> Option<AudioFrame> {
        self.recycled_audio.try_recv().ok()
    }
}

impl ChannelFrameSource {
    /// Frames (video and audio) returned so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}

impl FrameSource for ChannelFrameSource {
    fn get_video_frame(&self) -> Option<VideoFrame> {
        self.video.lock().ok()?.recv().ok()
    }

    fn get_audio_frame(&self) -> Option<AudioFrame> {
        self.audio.lock().ok()?.recv().ok()
    }

    fn free_video_frame(&self, frame: VideoFrame) {
        self.released.fetch_add(1, Ordering::Relaxed);
        if let Ok(tx) = self.recycle_video.lock() {
            // The feeder may already be gone; the frame is simply dropped.
            let _ = tx.send(frame);
        }
    }

    fn free_audio_frame(&self, frame: AudioFrame) {
        self.released.fetch_add(1, Ordering::Relaxed);
        if let Ok(tx) = self.recycle_audio.lock() {
            let _ = tx.send(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_frames_flow_and_come_back() {
        let (feeder, source) = frame_channel(2);
        let producer = thread::spawn(move || {
            for id in 0..3 {
                let mut video = feeder
                    .recycled_video()
                    .unwrap_or_else(|| VideoFrame::new(0, 2, 2));
                video.reset();
                video.id = id;
                assert!(feeder.push(video, AudioFrame::new(id, 48000, 2, 16)));
            }
        });

        let mut ids = Vec::new();
        while let Some(video) = source.get_video_frame() {
            let audio = source.get_audio_frame().unwrap();
            assert_eq!(video.id, audio.id);
            ids.push(video.id);
            source.free_video_frame(video);
            source.free_audio_frame(audio);
        }
        producer.join().unwrap();

        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(source.released(), 6);
    }

    #[test]
    fn test_push_fails_once_source_is_gone() {
        let (feeder, source) = frame_channel(1);
        drop(source);
        assert!(!feeder.push(VideoFrame::new(0, 1, 1), AudioFrame::new(0, 48000, 1, 16)));
    }
}
