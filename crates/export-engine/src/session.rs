//! Export session: the per-tick loop that drives frames from a source
//! through the encoder into the multiplexor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use framewright_common::clock::RunClock;
use framewright_common::config::{AppConfig, ExportDefaults};
use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{
    AudioFrame, Codec, FrameFlags, FramePair, FrameRange, FrameSource, JobConfig, MediaKind,
    RunControl, StreamMask, VideoFrame,
};
use framewright_module_core::{modules_match, ExtraData, ModuleFactory, ModuleInfo};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::control::SharedRunControl;
use crate::counters::{CounterSnapshot, SharedCounters};
use crate::encoder::Encoder;
use crate::multiplexor::Multiplexor;
use crate::rotation::RotationPolicy;

/// State of an export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, modules not loaded yet.
    Idle,
    /// Modules loaded and outputs open; ready to run the loop.
    Ready,
    /// Loop in progress.
    Running,
    /// Loop blocked at the pause point.
    Paused,
    /// Draining buffered encoder output.
    Draining,
    /// Outputs closed.
    Stopped,
    /// A stage failed; the outputs are incomplete.
    Failed,
}

/// Why the frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEnd {
    /// The frame source ran out of frames.
    Exhausted,
    /// An end-of-stream marker or the last frame of the range was seen.
    EndOfStream,
    /// The run control asked the loop to stop.
    Stopped,
}

/// Per-run tick accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExportStats {
    /// Frame ranges the loop ran over.
    pub ranges: u64,
    /// Frame pairs taken from the source.
    pub ticks: u64,
    /// Ticks dispatched to the encoder, failed dispatches included.
    pub encoded: u64,
    /// In-range ticks skipped by the frame interval.
    pub in_range_skipped: u64,
    /// Ticks outside the frame range, including the terminating tick.
    pub out_of_range: u64,
    /// Ticks the video encoder held back.
    pub delayed: u64,
    pub flushed_video: u64,
    pub flushed_audio: u64,
}

/// Summary of a finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub stats: ExportStats,
    pub counters: CounterSnapshot,
    pub end: LoopEnd,
    /// Chunk that received video last.
    pub video_output: Option<PathBuf>,
    /// Chunk that received audio last, in dual mode.
    pub audio_output: Option<PathBuf>,
    pub started_at: String,
    pub elapsed_secs: f64,
}

/// Frames borrowed from the source for one tick.
///
/// Both frames go back to the source when the guard is dropped, on every
/// path out of the tick.
struct TickFrames<'a> {
    source: &'a dyn FrameSource,
    video: VideoFrame,
    audio: AudioFrame,
}

impl Drop for TickFrames<'_> {
    fn drop(&mut self) {
        self.source.free_video_frame(std::mem::take(&mut self.video));
        self.source.free_audio_frame(std::mem::take(&mut self.audio));
    }
}

pub struct ExportSession {
    job: JobConfig,
    defaults: ExportDefaults,
    run_control: Arc<dyn RunControl>,
    counters: Arc<SharedCounters>,
    encoder: Encoder,
    mux: Multiplexor,
    video_extra: ExtraData,
    audio_extra: ExtraData,
    scratch: Option<FramePair>,
    state: SessionState,
    range: FrameRange,
    frame_id: Option<i64>,
    stats: ExportStats,
    clock: RunClock,
}

impl ExportSession {
    /// Create a session for `job`. The shared counters are reset.
    pub fn new(
        job: JobConfig,
        factory: Arc<dyn ModuleFactory>,
        run_control: Arc<dyn RunControl>,
        counters: Arc<SharedCounters>,
    ) -> FramewrightResult<Self> {
        job.validate()?;
        counters.reset();
        Ok(Self {
            range: job.range,
            job,
            defaults: ExportDefaults::default(),
            run_control,
            counters,
            encoder: Encoder::new(Arc::clone(&factory)),
            mux: Multiplexor::new(factory),
            video_extra: ExtraData::default(),
            audio_extra: ExtraData::default(),
            scratch: None,
            state: SessionState::Idle,
            frame_id: None,
            stats: ExportStats::default(),
            clock: RunClock::start(),
        })
    }

    /// Create a session for the job stored at `path`, using the user's
    /// configuration for module defaults and progress logging.
    ///
    /// The returned control pauses, resumes and stops the run.
    pub fn from_job_file(
        path: &Path,
        factory: Arc<dyn ModuleFactory>,
        counters: Arc<SharedCounters>,
    ) -> FramewrightResult<(Self, Arc<SharedRunControl>)> {
        let config = AppConfig::load();
        let job = JobConfig::load(path)?;
        let control = Arc::new(SharedRunControl::from_config(&config.export));
        let session =
            Self::new(job, factory, control.clone(), counters)?.with_defaults(&config.export);
        Ok((session, control))
    }

    /// Take module names left unset by the job from `defaults`. Turning
    /// the progress meter off there silences it for every job.
    pub fn with_defaults(mut self, defaults: &ExportDefaults) -> Self {
        self.defaults = defaults.clone();
        self.job.progress_meter &= defaults.progress_meter;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    pub fn stats(&self) -> ExportStats {
        self.stats
    }

    pub fn counters(&self) -> &Arc<SharedCounters> {
        &self.counters
    }

    /// Effective id of the most recent tick.
    pub fn frame_id(&self) -> Option<i64> {
        self.frame_id
    }

    pub fn multiplexor(&self) -> &Multiplexor {
        &self.mux
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Load the modules, settle the output codecs and check that every
    /// encoder produces something its multiplexor accepts.
    pub fn setup(&mut self) -> FramewrightResult<()> {
        self.expect_state(SessionState::Idle, "setup")?;

        self.job.apply_defaults(&self.defaults);
        let modules = self.job.modules.clone();
        let video_encoder = modules.video_encoder.unwrap_or_default();
        let audio_encoder = modules.audio_encoder.unwrap_or_default();
        let muxer = modules.muxer.unwrap_or_default();

        self.encoder.setup(&video_encoder, &audio_encoder)?;
        self.mux.setup(&muxer, modules.muxer_aux.as_deref(), &self.job)?;

        let video_codec = self.resolve_codec(MediaKind::Video)?;
        let audio_codec = self.resolve_codec(MediaKind::Audio)?;
        self.job.codecs.video = Some(video_codec);
        self.job.codecs.audio = Some(audio_codec);

        let rotation = self.job.rotation;
        self.mux.limit_frames(rotation.frames)?;
        self.mux.limit_megabytes(rotation.megabytes)?;
        if let Some(audio) = rotation.audio {
            self.mux.limit_audio(RotationPolicy::from_limits(audio))?;
        }

        info!(
            %video_encoder,
            %audio_encoder,
            %muxer,
            %video_codec,
            %audio_codec,
            dual = self.mux.is_dual(),
            "Export modules set up"
        );
        Ok(())
    }

    /// The codec to export for `kind`: the one the job asks for, or the
    /// encoder's default. Fails when the multiplexor cannot take it.
    fn resolve_codec(&self, kind: MediaKind) -> FramewrightResult<Codec> {
        let encoder = match kind {
            MediaKind::Video => self.encoder.video_info(),
            MediaKind::Audio => self.encoder.audio_info(),
        }
        .ok_or_else(|| FramewrightError::state("encoder modules are not set up"))?;
        let muxer = self
            .mux
            .info(kind)
            .ok_or_else(|| FramewrightError::state("multiplexor is not set up"))?;

        let requested = match kind {
            MediaKind::Video => self.job.codecs.video,
            MediaKind::Audio => self.job.codecs.audio,
        };
        let codec = requested
            .or_else(|| encoder.default_output(kind))
            .unwrap_or(Codec::Any);

        if !modules_match(codec, kind, encoder, muxer) {
            return Err(incompatible(kind, codec, encoder, muxer));
        }
        Ok(codec)
    }

    /// Allocate the scratch pair and configure the encoders, collecting
    /// the extra data they emit.
    pub fn init(&mut self) -> FramewrightResult<()> {
        self.expect_state(SessionState::Idle, "init")?;
        self.scratch = Some(FramePair::scratch(&self.job.specs));
        self.encoder
            .open(&self.job, &mut self.video_extra, &mut self.audio_extra)?;
        debug!(
            video_codec = %self.video_extra.codec,
            audio_codec = %self.audio_extra.codec,
            "Encoder extra data collected"
        );
        Ok(())
    }

    /// Open the outputs.
    pub fn open(&mut self) -> FramewrightResult<()> {
        self.expect_state(SessionState::Idle, "open")?;
        let output = &self.job.output;
        self.mux.open(
            &output.video,
            output.audio.as_deref(),
            &self.video_extra,
            &self.audio_extra,
        )?;
        self.state = SessionState::Ready;
        info!(
            video = %output.video.display(),
            audio = ?output.audio,
            "Export outputs opened"
        );
        Ok(())
    }

    /// Run the frame loop over `[first, last)`.
    ///
    /// Returns why the loop ended. A stage failure ends the loop with the
    /// error; the frames of the failing tick are still released.
    pub fn run_loop(
        &mut self,
        source: &dyn FrameSource,
        first: i64,
        last: Option<i64>,
    ) -> FramewrightResult<LoopEnd> {
        self.expect_state(SessionState::Ready, "run the export loop")?;
        self.range = FrameRange::new(first, last);
        self.state = SessionState::Running;
        debug!(first, last = ?last, "Export loop started");

        match self.frame_loop(source) {
            Ok(end) => {
                self.state = SessionState::Ready;
                info!(?end, frame = ?self.frame_id, ticks = self.stats.ticks, "Export loop finished");
                Ok(end)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                error!(frame = ?self.frame_id, error = %e, "Export loop failed");
                Err(e)
            }
        }
    }

    fn frame_loop(&mut self, source: &dyn FrameSource) -> FramewrightResult<LoopEnd> {
        let mut skip = 0u32;
        loop {
            if !self.run_control.status().is_running() {
                return Ok(LoopEnd::Stopped);
            }

            if self.run_control.is_paused() {
                self.state = SessionState::Paused;
                info!(frame = ?self.frame_id, "Export paused");
            }
            self.run_control.pause();
            self.state = SessionState::Running;

            let Some(video) = source.get_video_frame() else {
                debug!("Failed to acquire next raw video frame");
                return Ok(LoopEnd::Exhausted);
            };
            let Some(audio) = source.get_audio_frame() else {
                debug!("Failed to acquire next raw audio frame");
                source.free_video_frame(video);
                return Ok(LoopEnd::Exhausted);
            };
            let mut frames = TickFrames {
                source,
                video,
                audio,
            };
            self.stats.ticks += 1;

            if !self.run_control.status().is_running() {
                return Ok(LoopEnd::Stopped);
            }

            if self.tick(&mut frames, &mut skip)? {
                debug!(frame = ?self.frame_id, last = ?self.range.last, "Encoder last frame finished");
                return Ok(LoopEnd::EndOfStream);
            }
        }
    }

    /// Process one frame pair. Returns `true` when this was the last tick.
    fn tick(&mut self, frames: &mut TickFrames<'_>, skip: &mut u32) -> FramewrightResult<bool> {
        check_flags(frames.video.flags, MediaKind::Video)?;
        check_flags(frames.audio.flags, MediaKind::Audio)?;

        let id = self.effective_id(frames.video.id);
        self.frame_id = Some(id);

        let end_of_stream = frames.video.flags.contains(FrameFlags::END_OF_STREAM)
            || frames.audio.flags.contains(FrameFlags::END_OF_STREAM);
        if end_of_stream {
            frames.video.flags.remove(FrameFlags::END_OF_STREAM);
            frames.audio.flags.remove(FrameFlags::END_OF_STREAM);
        }
        let last = end_of_stream || self.range.is_last(id);

        if !last && self.range.contains(id) {
            if *skip > 0 {
                self.skip_in_range(id);
                *skip -= 1;
            } else {
                self.export_tick(id, frames)?;
                *skip = self.job.frame_interval.saturating_sub(1);
            }
        } else {
            frames.video.flags.insert(FrameFlags::OUT_OF_RANGE);
            frames.audio.flags.insert(FrameFlags::OUT_OF_RANGE);
            self.stats.out_of_range += 1;
        }
        Ok(last)
    }

    /// Map a source frame id onto the export timeline.
    ///
    /// Frames dropped upstream pull later ids back; cloned frames push
    /// them forward. Cluster mode also discounts frames dropped by
    /// another pass.
    fn effective_id(&self, raw: i64) -> i64 {
        let mut id = raw - self.counters.skipped_minus_cloned();
        if self.job.cluster_mode {
            id -= self.counters.dropped() as i64;
        }
        id
    }

    /// Dispatch one tick to the encoder. The dispatch is counted and
    /// reported even when encoding or writing fails.
    fn export_tick(&mut self, id: i64, frames: &mut TickFrames<'_>) -> FramewrightResult<()> {
        let result = self.encode_and_write(frames);
        self.report_progress(true, id);
        self.counters.add_encoded(1);
        self.stats.encoded += 1;
        result
    }

    fn encode_and_write(&mut self, frames: &mut TickFrames<'_>) -> FramewrightResult<()> {
        let scratch = self
            .scratch
            .as_mut()
            .ok_or_else(|| FramewrightError::state("export buffers are not allocated"))?;
        scratch.video.reset();
        scratch.audio.reset();

        let outcome = self.encoder.process(
            &mut frames.video,
            &mut scratch.video,
            &mut frames.audio,
            &mut scratch.audio,
        )?;
        if outcome.delayed {
            self.counters.add_cloned(1);
            self.stats.delayed += 1;
        }
        self.mux.export(scratch)
    }

    fn skip_in_range(&mut self, id: i64) {
        self.stats.in_range_skipped += 1;
        self.report_progress(false, id);
    }

    fn report_progress(&self, encoding: bool, id: i64) {
        if self.job.progress_meter {
            self.run_control
                .progress(encoding, id, self.range.first, self.range.last);
        }
    }

    /// Drain frames still buffered in the encoders into the current chunks.
    pub fn flush(&mut self) -> FramewrightResult<()> {
        self.expect_state(SessionState::Ready, "flush")?;
        self.state = SessionState::Draining;
        let result = self.drain();
        self.state = match result {
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn drain(&mut self) -> FramewrightResult<()> {
        let scratch = self
            .scratch
            .as_mut()
            .ok_or_else(|| FramewrightError::state("export buffers are not allocated"))?;
        loop {
            scratch.video.reset();
            scratch.audio.reset();
            let produced = self.encoder.flush(&mut scratch.video, &mut scratch.audio)?;
            if produced.is_empty() {
                break;
            }

            let video = produced.contains(StreamMask::VIDEO).then_some(&scratch.video);
            let audio = produced.contains(StreamMask::AUDIO).then_some(&scratch.audio);
            self.mux.write(video, audio, false).map_err(|e| {
                error!(error = %e, "Write error while flushing data");
                e
            })?;

            if video.is_some() {
                self.stats.flushed_video += 1;
            }
            if audio.is_some() {
                self.stats.flushed_audio += 1;
            }
        }
        debug!(
            video = self.stats.flushed_video,
            audio = self.stats.flushed_audio,
            "Encoders drained"
        );
        Ok(())
    }

    /// Stop the encoders and release the scratch pair.
    pub fn stop(&mut self) -> FramewrightResult<()> {
        self.encoder.close()?;
        self.scratch = None;
        Ok(())
    }

    /// Close the outputs.
    pub fn close(&mut self) -> FramewrightResult<()> {
        let result = self.mux.close();
        if self.state != SessionState::Failed {
            self.state = SessionState::Stopped;
        }
        result
    }

    /// Release every module.
    pub fn shutdown(&mut self) -> FramewrightResult<()> {
        self.encoder.shutdown();
        self.mux.shutdown()
    }

    /// Drive the whole export: setup, loop over each of the job's ranges,
    /// drain once, and tear down.
    ///
    /// A failure in the loop skips the drain; the encoders and outputs are
    /// still closed and the first error is returned.
    pub fn run(&mut self, source: &dyn FrameSource) -> FramewrightResult<ExportReport> {
        info!(
            video = %self.job.output.video.display(),
            first = self.job.range.first,
            last = ?self.job.range.last,
            interval = self.job.frame_interval,
            "Starting export"
        );

        if let Err(e) = self.prepare() {
            self.state = SessionState::Failed;
            self.teardown();
            return Err(e);
        }

        let ranges: Vec<FrameRange> = self.job.ranges().copied().collect();
        let result = self
            .run_ranges(source, &ranges)
            .and_then(|end| self.flush().map(|()| end));

        let video_output = self.mux.output_path(MediaKind::Video).map(PathBuf::from);
        let audio_output = if self.mux.is_dual() {
            self.mux.output_path(MediaKind::Audio).map(PathBuf::from)
        } else {
            None
        };

        let end = match result {
            Ok(end) => end,
            Err(e) => {
                self.teardown();
                return Err(e);
            }
        };

        let stopped = self.stop();
        let closed = self.close();
        let shut = self.shutdown();
        FramewrightError::aggregate(
            [stopped, closed, shut]
                .into_iter()
                .filter_map(Result::err)
                .collect(),
        )?;

        let report = ExportReport {
            stats: self.stats,
            counters: self.counters.snapshot(),
            end,
            video_output,
            audio_output,
            started_at: self.clock.epoch_wall().to_string(),
            elapsed_secs: self.clock.elapsed_secs(),
        };
        info!(
            encoded = report.stats.encoded,
            ticks = report.stats.ticks,
            elapsed_secs = report.elapsed_secs,
            "Export finished"
        );
        Ok(report)
    }

    /// Run the loop over each range in turn, stopping early once the run
    /// control no longer reports running.
    fn run_ranges(&mut self, source: &dyn FrameSource, ranges: &[FrameRange]) -> FramewrightResult<LoopEnd> {
        let mut end = LoopEnd::Exhausted;
        for (index, range) in ranges.iter().enumerate() {
            debug!(index, first = range.first, last = ?range.last, "Exporting frame range");
            end = self.run_loop(source, range.first, range.last)?;
            self.stats.ranges += 1;
            if end == LoopEnd::Stopped || !self.run_control.status().is_running() {
                break;
            }
        }
        Ok(end)
    }

    fn prepare(&mut self) -> FramewrightResult<()> {
        self.setup()?;
        self.init()?;
        self.open()
    }

    /// Best-effort teardown after a failure. Errors are logged only.
    fn teardown(&mut self) {
        self.state = SessionState::Failed;
        if let Err(e) = self.stop() {
            warn!(error = %e, "Failed to stop encoders after export failure");
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close outputs after export failure");
        }
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Failed to shut down modules after export failure");
        }
    }

    fn expect_state(&self, expected: SessionState, action: &str) -> FramewrightResult<()> {
        if self.state != expected {
            return Err(FramewrightError::state(format!(
                "cannot {action} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

fn check_flags(flags: FrameFlags, kind: MediaKind) -> FramewrightResult<()> {
    FrameFlags::validate(flags.bits())?;
    flags.disposition().map(|_| ()).map_err(|e| {
        error!(stream = %kind, ?flags, "Rejecting frame with conflicting attributes");
        e
    })
}

fn incompatible(kind: MediaKind, codec: Codec, encoder: &ModuleInfo, muxer: &ModuleInfo) -> FramewrightError {
    error!(
        stream = %kind,
        %codec,
        encoder = %encoder.name,
        muxer = %muxer.name,
        "Encoder incompatible with multiplexor"
    );
    FramewrightError::incompatible(format!(
        "{kind} encoder '{}' ({codec}) incompatible with multiplexor '{}'",
        encoder.name, muxer.name
    ))
}
