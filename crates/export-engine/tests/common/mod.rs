#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_export_engine::{ExportSession, SharedCounters};
use framewright_media_model::{
    AudioFrame, Codec, FrameFlags, FrameSource, JobConfig, RunControl, RunStatus, StreamMask,
    VideoFrame,
};
use framewright_module_core::{
    EncodeModule, ExtraData, Module, ModuleClass, ModuleInfo, ModuleRegistry, MuxModule,
};

pub const ENCODER: &str = "scripted";
pub const MUXER: &str = "memory";
pub const HEADER: &[u8] = b"HDR";

/// Frame source replaying prepared frames and recording every release.
#[derive(Default)]
pub struct ScriptedSource {
    video: Mutex<VecDeque<VideoFrame>>,
    audio: Mutex<VecDeque<AudioFrame>>,
    taken_video: AtomicU64,
    taken_audio: AtomicU64,
    released_video: Mutex<Vec<VideoFrame>>,
    released_audio: Mutex<Vec<AudioFrame>>,
}

impl ScriptedSource {
    /// One pair per id, each carrying `payload` bytes of video and half
    /// as many of audio.
    pub fn sequence(ids: std::ops::Range<i64>, payload: usize) -> Self {
        let source = Self::default();
        for id in ids {
            source.push(
                VideoFrame::with_data(id, 4, 4, vec![id as u8; payload]),
                AudioFrame::with_data(id, 48000, 2, 16, vec![id as u8; payload / 2]),
            );
        }
        source
    }

    pub fn push(&self, video: VideoFrame, audio: AudioFrame) {
        self.video.lock().unwrap().push_back(video);
        self.audio.lock().unwrap().push_back(audio);
    }

    /// Set `flags` on the video frame with source id `id`.
    pub fn flag_video(self, id: i64, flags: FrameFlags) -> Self {
        for frame in self.video.lock().unwrap().iter_mut().filter(|f| f.id == id) {
            frame.flags |= flags;
        }
        self
    }

    /// Keep only the first `n` audio frames.
    pub fn truncate_audio(self, n: usize) -> Self {
        self.audio.lock().unwrap().truncate(n);
        self
    }

    pub fn taken(&self) -> (u64, u64) {
        (
            self.taken_video.load(Ordering::SeqCst),
            self.taken_audio.load(Ordering::SeqCst),
        )
    }

    pub fn released(&self) -> (u64, u64) {
        (
            self.released_video.lock().unwrap().len() as u64,
            self.released_audio.lock().unwrap().len() as u64,
        )
    }

    pub fn released_video(&self) -> Vec<VideoFrame> {
        self.released_video.lock().unwrap().clone()
    }

    pub fn released_audio(&self) -> Vec<AudioFrame> {
        self.released_audio.lock().unwrap().clone()
    }

    /// Every acquired frame came back exactly once.
    pub fn assert_balanced(&self) {
        assert_eq!(self.taken(), self.released());
        let ids: Vec<i64> = self.released_video().iter().map(|f| f.id).collect();
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len(), "video frame released twice: {ids:?}");
    }
}

impl FrameSource for ScriptedSource {
    fn get_video_frame(&self) -> Option<VideoFrame> {
        let frame = self.video.lock().unwrap().pop_front()?;
        self.taken_video.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    fn get_audio_frame(&self) -> Option<AudioFrame> {
        let frame = self.audio.lock().unwrap().pop_front()?;
        self.taken_audio.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    fn free_video_frame(&self, frame: VideoFrame) {
        self.released_video.lock().unwrap().push(frame);
    }

    fn free_audio_frame(&self, frame: AudioFrame) {
        self.released_audio.lock().unwrap().push(frame);
    }
}

/// Run control recording every progress report.
#[derive(Default)]
pub struct RecordingControl {
    stopped: AtomicBool,
    stop_after: Option<usize>,
    reports: Mutex<Vec<(bool, i64, i64, Option<i64>)>>,
}

impl RecordingControl {
    /// Stop the run once `n` progress reports arrived.
    pub fn stopping_after(n: usize) -> Self {
        Self {
            stop_after: Some(n),
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<(bool, i64, i64, Option<i64>)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn encoded_ids(&self) -> Vec<i64> {
        self.reports()
            .into_iter()
            .filter(|(encoding, ..)| *encoding)
            .map(|(_, id, ..)| id)
            .collect()
    }
}

impl RunControl for RecordingControl {
    fn status(&self) -> RunStatus {
        if self.stopped.load(Ordering::SeqCst) {
            RunStatus::Stopped
        } else {
            RunStatus::Running
        }
    }

    fn pause(&self) {}

    fn progress(&self, encoding: bool, frame_id: i64, first: i64, last: Option<i64>) {
        let mut reports = self.reports.lock().unwrap();
        reports.push((encoding, frame_id, first, last));
        if self.stop_after.is_some_and(|n| reports.len() >= n) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }
}

/// Behaviour of the scripted encoder, keyed by source frame id.
#[derive(Debug, Default, Clone)]
pub struct EncoderScript {
    pub delay_video: Vec<i64>,
    pub fail_video: Option<i64>,
    pub fail_audio: Option<i64>,
    pub fail_flush_video: bool,
    pub fail_flush_audio: bool,
    pub fail_stop: bool,
}

/// Options string that makes the scripted encoder refuse configuration.
pub const REJECTED_OPTIONS: &str = "reject";

#[derive(Debug, Default)]
pub struct EncoderLog {
    pub video: Vec<i64>,
    pub audio: Vec<i64>,
    /// Options passed to every `configure` call, in order.
    pub configured: Vec<String>,
    pub stops: u32,
}

/// Copies payloads, holds back scripted video frames and releases them
/// on flush.
pub struct ScriptedEncoder {
    info: ModuleInfo,
    script: EncoderScript,
    log: Arc<Mutex<EncoderLog>>,
    held: VecDeque<VideoFrame>,
}

impl ScriptedEncoder {
    pub fn new(script: EncoderScript, log: Arc<Mutex<EncoderLog>>) -> Self {
        Self {
            info: ModuleInfo::new(ENCODER, "test encoder", ModuleClass::Encode, StreamMask::all())
                .accepting(&[Codec::Any], &[Codec::Any])
                .producing(&[Codec::RawVideo], &[Codec::Pcm]),
            script,
            log,
            held: VecDeque::new(),
        }
    }
}

impl Module for ScriptedEncoder {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        options: &str,
        _job: &JobConfig,
        extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        self.log.lock().unwrap().configured.push(options.to_string());
        if options == REJECTED_OPTIONS {
            return Err(FramewrightError::config("scripted configure failure"));
        }
        if let Some(extra) = extra {
            *extra = ExtraData::new(Codec::RawVideo, HEADER.to_vec());
        }
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        self.log.lock().unwrap().stops += 1;
        if self.script.fail_stop {
            return Err(FramewrightError::state("scripted stop failure"));
        }
        Ok(())
    }
}

impl EncodeModule for ScriptedEncoder {
    fn encode_video(&mut self, input: &mut VideoFrame, output: &mut VideoFrame) -> FramewrightResult<()> {
        if self.script.fail_video == Some(input.id) {
            return Err(FramewrightError::state("scripted video failure"));
        }
        if self.script.delay_video.contains(&input.id) {
            self.held.push_back(input.clone());
            input.flags.insert(FrameFlags::DELAYED);
            return Ok(());
        }
        output.id = input.id;
        output.data.extend_from_slice(&input.data);
        self.log.lock().unwrap().video.push(input.id);
        Ok(())
    }

    fn encode_audio(&mut self, input: &mut AudioFrame, output: &mut AudioFrame) -> FramewrightResult<()> {
        if self.script.fail_audio == Some(input.id) {
            return Err(FramewrightError::state("scripted audio failure"));
        }
        output.id = input.id;
        output.data.extend_from_slice(&input.data);
        self.log.lock().unwrap().audio.push(input.id);
        Ok(())
    }

    fn flush_video(&mut self, output: &mut VideoFrame) -> FramewrightResult<bool> {
        if self.script.fail_flush_video {
            return Err(FramewrightError::state("scripted video flush failure"));
        }
        let Some(frame) = self.held.pop_front() else {
            return Ok(false);
        };
        output.id = frame.id;
        output.data.extend_from_slice(&frame.data);
        self.log.lock().unwrap().video.push(frame.id);
        Ok(true)
    }

    fn flush_audio(&mut self, _output: &mut AudioFrame) -> FramewrightResult<bool> {
        if self.script.fail_flush_audio {
            return Err(FramewrightError::state("scripted audio flush failure"));
        }
        Ok(false)
    }
}

/// One chunk as seen by the in-memory muxer.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub path: PathBuf,
    pub header: Vec<u8>,
    pub video: Vec<i64>,
    pub audio: Vec<i64>,
    pub bytes: u64,
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct MuxLog {
    pub chunks: Vec<Chunk>,
    /// Fail the n-th write (1-based, video and audio counted together).
    pub fail_write: Option<usize>,
    pub writes: usize,
    /// Fail the n-th open (1-based, across every muxer instance).
    pub fail_open: Option<usize>,
    pub opens: usize,
    /// Fail the n-th close (1-based, across every muxer instance).
    pub fail_close: Option<usize>,
    pub closes: usize,
}

impl MuxLog {
    /// Chunks whose path starts with `base`, in open order.
    pub fn chunks_of(&self, base: &str) -> Vec<Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.path.to_string_lossy().starts_with(base))
            .cloned()
            .collect()
    }
}

/// Records chunk boundaries instead of writing files. Empty payloads
/// are accepted but not recorded.
pub struct MemoryMuxer {
    info: ModuleInfo,
    log: Arc<Mutex<MuxLog>>,
    current: Option<usize>,
}

impl MemoryMuxer {
    pub fn new(log: Arc<Mutex<MuxLog>>) -> Self {
        Self {
            info: ModuleInfo::new(MUXER, "test muxer", ModuleClass::Multiplex, StreamMask::all())
                .accepting(&[Codec::RawVideo, Codec::Null], &[Codec::Pcm, Codec::Null]),
            log,
            current: None,
        }
    }

    fn record<F>(&mut self, bytes: usize, update: F) -> FramewrightResult<u64>
    where
        F: FnOnce(&mut Chunk),
    {
        let index = self
            .current
            .ok_or_else(|| FramewrightError::state("memory muxer is not open"))?;
        let mut log = self.log.lock().unwrap();
        log.writes += 1;
        if log.fail_write == Some(log.writes) {
            return Err(FramewrightError::state("scripted write failure"));
        }
        if bytes == 0 {
            return Ok(0);
        }
        let chunk = &mut log.chunks[index];
        update(chunk);
        chunk.bytes += bytes as u64;
        Ok(bytes as u64)
    }
}

impl Module for MemoryMuxer {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn configure(
        &mut self,
        _options: &str,
        _job: &JobConfig,
        _extra: Option<&mut ExtraData>,
    ) -> FramewrightResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> FramewrightResult<()> {
        Ok(())
    }
}

impl MuxModule for MemoryMuxer {
    fn open(&mut self, sink: &Path, extra: &[&ExtraData]) -> FramewrightResult<()> {
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        if log.fail_open == Some(log.opens) {
            return Err(FramewrightError::state("scripted open failure"));
        }
        let header = extra.iter().flat_map(|x| x.data.iter().copied()).collect();
        log.chunks.push(Chunk {
            path: sink.to_path_buf(),
            header,
            ..Chunk::default()
        });
        self.current = Some(log.chunks.len() - 1);
        Ok(())
    }

    fn close(&mut self) -> FramewrightResult<()> {
        let Some(index) = self.current else {
            return Ok(());
        };
        let mut log = self.log.lock().unwrap();
        log.closes += 1;
        if log.fail_close == Some(log.closes) {
            return Err(FramewrightError::state("scripted close failure"));
        }
        log.chunks[index].closed = true;
        self.current = None;
        Ok(())
    }

    fn write_video(&mut self, frame: &VideoFrame) -> FramewrightResult<u64> {
        let id = frame.id;
        self.record(frame.len(), |chunk| chunk.video.push(id))
    }

    fn write_audio(&mut self, frame: &AudioFrame) -> FramewrightResult<u64> {
        let id = frame.id;
        self.record(frame.len(), |chunk| chunk.audio.push(id))
    }
}

/// Registry with the built-ins plus the scripted encoder and memory muxer.
pub struct Harness {
    pub encoder_log: Arc<Mutex<EncoderLog>>,
    pub mux_log: Arc<Mutex<MuxLog>>,
    pub counters: Arc<SharedCounters>,
    pub control: Arc<RecordingControl>,
    script: EncoderScript,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_script(EncoderScript::default())
    }

    pub fn with_script(script: EncoderScript) -> Self {
        Self {
            encoder_log: Arc::default(),
            mux_log: Arc::default(),
            counters: SharedCounters::new(),
            control: Arc::new(RecordingControl::default()),
            script,
        }
    }

    pub fn with_control(mut self, control: RecordingControl) -> Self {
        self.control = Arc::new(control);
        self
    }

    pub fn registry(&self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::builtin();
        let script = self.script.clone();
        let log = Arc::clone(&self.encoder_log);
        registry
            .register_encoder(ENCODER, StreamMask::all(), move || {
                Box::new(ScriptedEncoder::new(script.clone(), Arc::clone(&log)))
            })
            .unwrap();
        let log = Arc::clone(&self.mux_log);
        registry
            .register_muxer(MUXER, StreamMask::all(), move || {
                Box::new(MemoryMuxer::new(Arc::clone(&log)))
            })
            .unwrap();
        registry
    }

    pub fn session(&self, job: JobConfig) -> ExportSession {
        ExportSession::new(
            job,
            Arc::new(self.registry()),
            self.control.clone(),
            Arc::clone(&self.counters),
        )
        .unwrap()
    }

    pub fn mux(&self) -> std::sync::MutexGuard<'_, MuxLog> {
        self.mux_log.lock().unwrap()
    }

    pub fn encoded(&self) -> (Vec<i64>, Vec<i64>) {
        let log = self.encoder_log.lock().unwrap();
        (log.video.clone(), log.audio.clone())
    }
}

/// A mono job using the scripted encoder and memory muxer.
pub fn job(output: &str) -> JobConfig {
    let mut job = JobConfig::new(output);
    job.modules.video_encoder = Some(ENCODER.to_string());
    job.modules.audio_encoder = Some(ENCODER.to_string());
    job.modules.muxer = Some(MUXER.to_string());
    job
}

/// A dual job writing video to `video` and audio to `audio`.
pub fn dual_job(video: &str, audio: &str) -> JobConfig {
    let mut job = job(video);
    job.modules.muxer_aux = Some(MUXER.to_string());
    job.output.audio = Some(PathBuf::from(audio));
    job
}

pub fn chunk_sizes(chunks: &[Chunk], kind: framewright_media_model::MediaKind) -> Vec<usize> {
    chunks
        .iter()
        .map(|c| match kind {
            framewright_media_model::MediaKind::Video => c.video.len(),
            framewright_media_model::MediaKind::Audio => c.audio.len(),
        })
        .collect()
}
