//! Running an export off the caller's thread.
//!
//! The frame loop blocks on its source and on the pause point, so it
//! always runs on a thread of its own: a tokio blocking task for async
//! callers, or a named OS thread otherwise.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::FrameSource;

use crate::session::{ExportReport, ExportSession};

/// Run `session` to completion on tokio's blocking pool.
pub async fn export_async(
    mut session: ExportSession,
    source: Arc<dyn FrameSource>,
) -> FramewrightResult<ExportReport> {
    tokio::task::spawn_blocking(move || session.run(source.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Export task panicked");
            FramewrightError::Other(anyhow::anyhow!("export task failed: {e}"))
        })?
}

/// Run `session` on a dedicated thread.
pub fn spawn_export(
    mut session: ExportSession,
    source: Arc<dyn FrameSource>,
) -> FramewrightResult<JoinHandle<FramewrightResult<ExportReport>>> {
    let handle = thread::Builder::new()
        .name("framewright-export".to_string())
        .spawn(move || session.run(source.as_ref()))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SharedRunControl;
    use crate::counters::SharedCounters;
    use crate::source::frame_channel;
    use framewright_media_model::{AudioFrame, JobConfig, VideoFrame};
    use framewright_module_core::ModuleRegistry;

    fn session(job: JobConfig) -> ExportSession {
        ExportSession::new(
            job,
            Arc::new(ModuleRegistry::builtin()),
            Arc::new(SharedRunControl::quiet()),
            SharedCounters::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_export_async_runs_to_exhaustion() {
        let (feeder, source) = frame_channel(4);
        let source = Arc::new(source);
        let producer = thread::spawn(move || {
            for id in 0..10 {
                feeder.push(VideoFrame::new(id, 2, 2), AudioFrame::new(id, 48000, 2, 16));
            }
        });

        let report = export_async(session(JobConfig::new("/dev/null")), source.clone())
            .await
            .unwrap();
        producer.join().unwrap();

        assert_eq!(report.stats.encoded, 10);
        assert_eq!(source.released(), 20);
    }

    #[test]
    fn test_spawn_export_reports_setup_failure() {
        let mut job = JobConfig::new("/dev/null");
        job.modules.muxer = Some("avi".to_string());
        let (_feeder, source) = frame_channel(1);

        let handle = spawn_export(session(job), Arc::new(source)).unwrap();
        assert_eq!(handle.thread().name(), Some("framewright-export"));
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, FramewrightError::ModuleNotFound { .. }));
    }
}
