//! In-process run control: pause, resume and stop from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use framewright_common::clock::{RateController, RunClock};
use framewright_common::config::ExportDefaults;
use framewright_media_model::{RunControl, RunStatus};

#[derive(Debug)]
struct ControlState {
    status: RunStatus,
    paused: bool,
}

/// A [`RunControl`] driven through method calls.
///
/// Progress is logged through `tracing`, throttled to a fixed rate, with a
/// tick rate measured from the moment the control was created.
#[derive(Debug)]
pub struct SharedRunControl {
    state: Mutex<ControlState>,
    resumed: Condvar,
    clock: RunClock,
    throttle: Mutex<RateController>,
    progress_hz: u32,
    log_progress: bool,
    ticks: AtomicU64,
    encoded: AtomicU64,
    last_frame: Mutex<Option<i64>>,
}

impl SharedRunControl {
    pub fn new() -> Self {
        Self::from_config(&ExportDefaults::default())
    }

    /// Log progress at the configured rate.
    pub fn from_config(defaults: &ExportDefaults) -> Self {
        Self::with_progress_rate(defaults.progress_log_hz)
    }

    /// Log progress at most `hz` times per second.
    pub fn with_progress_rate(hz: u32) -> Self {
        Self {
            state: Mutex::new(ControlState {
                status: RunStatus::Running,
                paused: false,
            }),
            resumed: Condvar::new(),
            clock: RunClock::start(),
            throttle: Mutex::new(RateController::new(hz)),
            progress_hz: hz.max(1),
            log_progress: true,
            ticks: AtomicU64::new(0),
            encoded: AtomicU64::new(0),
            last_frame: Mutex::new(None),
        }
    }

    /// Count progress without logging it.
    pub fn quiet() -> Self {
        Self {
            log_progress: false,
            ..Self::new()
        }
    }

    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn request_pause(&self) {
        self.state().paused = true;
        tracing::info!("Export pause requested");
    }

    pub fn resume(&self) {
        self.state().paused = false;
        self.resumed.notify_all();
        tracing::info!("Export resumed");
    }

    /// Request an orderly stop. Wakes a paused loop.
    pub fn stop(&self) {
        self.set_status(RunStatus::Stopped);
    }

    /// Request an abnormal stop. Wakes a paused loop.
    pub fn interrupt(&self) {
        self.set_status(RunStatus::Interrupted);
    }

    fn set_status(&self, status: RunStatus) {
        let mut state = self.state();
        if state.status.is_running() {
            state.status = status;
            tracing::info!(?status, "Export stop requested");
        }
        drop(state);
        self.resumed.notify_all();
    }

    /// Ticks reported through `progress`.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks reported as encoded.
    pub fn encoded_ticks(&self) -> u64 {
        self.encoded.load(Ordering::Relaxed)
    }

    /// Frame id of the most recent progress report.
    pub fn last_frame(&self) -> Option<i64> {
        *self
            .last_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    /// Maximum progress log lines per second.
    pub fn progress_rate(&self) -> u32 {
        self.progress_hz
    }
}

impl Default for SharedRunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl for SharedRunControl {
    fn status(&self) -> RunStatus {
        self.state().status
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn pause(&self) {
        let mut state = self.state();
        while state.paused && state.status.is_running() {
            state = self
                .resumed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn progress(&self, encoding: bool, frame_id: i64, first: i64, last: Option<i64>) {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if encoding {
            self.encoded.fetch_add(1, Ordering::Relaxed);
        }
        *self
            .last_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame_id);

        if !self.log_progress {
            return;
        }
        let due = self
            .throttle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .should_tick(self.clock.elapsed_ns());
        if due {
            let fps = self.clock.rate(ticks);
            match last {
                Some(last) => {
                    let span = (last - first).max(1) as f64;
                    let percent = ((frame_id - first) as f64 / span * 100.0).clamp(0.0, 100.0);
                    tracing::info!(frame = frame_id, first, last, percent, fps, encoding, "Export progress");
                }
                None => {
                    tracing::info!(frame = frame_id, first, fps, encoding, "Export progress");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stop_wakes_paused_loop() {
        let control = Arc::new(SharedRunControl::quiet());
        control.request_pause();
        assert!(control.is_paused());

        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || {
                control.pause();
                control.status()
            })
        };
        thread::sleep(Duration::from_millis(20));
        control.stop();
        assert_eq!(waiter.join().unwrap(), RunStatus::Stopped);
    }

    #[test]
    fn test_resume_releases_pause() {
        let control = Arc::new(SharedRunControl::quiet());
        control.request_pause();
        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.pause())
        };
        thread::sleep(Duration::from_millis(20));
        control.resume();
        waiter.join().unwrap();
        assert_eq!(control.status(), RunStatus::Running);
    }

    #[test]
    fn test_first_stop_status_wins() {
        let control = SharedRunControl::quiet();
        control.interrupt();
        control.stop();
        assert_eq!(control.status(), RunStatus::Interrupted);
    }

    #[test]
    fn test_progress_rate_follows_config() {
        assert_eq!(SharedRunControl::new().progress_rate(), ExportDefaults::default().progress_log_hz);

        let defaults = ExportDefaults {
            progress_log_hz: 10,
            ..ExportDefaults::default()
        };
        assert_eq!(SharedRunControl::from_config(&defaults).progress_rate(), 10);
        assert_eq!(SharedRunControl::with_progress_rate(0).progress_rate(), 1);
    }

    #[test]
    fn test_progress_counts_ticks() {
        let control = SharedRunControl::new();
        control.progress(true, 0, 0, Some(10));
        control.progress(false, 1, 0, None);
        assert_eq!(control.ticks(), 2);
        assert_eq!(control.encoded_ticks(), 1);
        assert_eq!(control.last_frame(), Some(1));
    }
}
