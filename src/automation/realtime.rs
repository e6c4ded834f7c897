//! Real-time sidechain ducker
//!
//! The ducker keeps a sliding RMS window over the most recent foreground
//! samples. Each `tick` moves the background gain toward the ducked or the
//! normal level with separate attack and release time constants. A periodic
//! tokio task drives `tick` until its handle is stopped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::ducking::DuckingParams;
use crate::analysis::presence::DEFAULT_PRESENCE_WINDOW;
use crate::engine::buffer::{linear_to_db, rms};

/// Sidechain ducker state
#[derive(Debug, Clone)]
pub struct RealtimeDucker {
    params: DuckingParams,
    normal: f32,
    window: VecDeque<f32>,
    window_len: usize,
    gain: f32,
}

impl RealtimeDucker {
    pub fn new(params: DuckingParams, sample_rate: u32, normal: f32) -> Self {
        let window_len = ((DEFAULT_PRESENCE_WINDOW * sample_rate as f64).round() as usize).max(1);
        Self {
            params,
            normal,
            window: VecDeque::with_capacity(window_len),
            window_len,
            gain: normal,
        }
    }

    pub fn params(&self) -> &DuckingParams {
        &self.params
    }

    /// Current background gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Feed foreground samples; only the last 50ms are kept
    pub fn push_foreground(&mut self, samples: &[f32]) {
        let keep = samples.len().min(self.window_len);
        let overflow = (self.window.len() + keep).saturating_sub(self.window_len);
        self.window.drain(..overflow);
        self.window.extend(&samples[samples.len() - keep..]);
    }

    /// RMS level of the foreground window in dB
    pub fn foreground_level_db(&self) -> f32 {
        let (a, b) = self.window.as_slices();
        if a.is_empty() && b.is_empty() {
            return f32::NEG_INFINITY;
        }
        let energy = rms(a).powi(2) * a.len() as f32 + rms(b).powi(2) * b.len() as f32;
        linear_to_db((energy / (a.len() + b.len()) as f32).sqrt())
    }

    /// Advance the gain smoother by `dt` seconds and return the new gain
    pub fn tick(&mut self, dt: f64) -> f32 {
        let target = if self.foreground_level_db() > self.params.threshold_db {
            self.params.ducked_level(self.normal)
        } else {
            self.normal
        };
        let tau = if target < self.gain {
            self.params.attack
        } else {
            self.params.release
        };
        let step = if tau > 0.0 {
            (1.0 - (-dt.max(0.0) / tau).exp()) as f32
        } else {
            1.0
        };
        self.gain += (target - self.gain) * step;
        self.gain
    }

    /// Scale background samples by the current gain
    pub fn process_background(&self, samples: &mut [f32]) {
        for sample in samples {
            *sample *= self.gain;
        }
    }

    /// Clear the window and return to the normal level
    pub fn reset(&mut self) {
        self.window.clear();
        self.gain = self.normal;
    }
}

/// Shared ducker handle used by the audio callback and the tick task
pub type SharedDucker = Arc<Mutex<RealtimeDucker>>;

/// Lock a shared ducker, recovering from a poisoned lock
pub fn lock_ducker(ducker: &SharedDucker) -> MutexGuard<'_, RealtimeDucker> {
    ducker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a running ducker tick loop
#[derive(Debug)]
pub struct DuckerTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DuckerTask {
    /// Ask the loop to stop; it exits before its next tick
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            debug!(error = %e, "ducker task ended abnormally");
        }
    }
}

/// Tick `ducker` every `period` on the current tokio runtime
///
/// The loop runs until [`DuckerTask::stop`] is called or the handle is
/// dropped. Must be called from within a tokio runtime.
pub fn spawn_ducker_task(ducker: SharedDucker, period: Duration) -> DuckerTask {
    let (cancel, mut cancelled) = watch::channel(false);
    let dt = period.as_secs_f64();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                changed = cancelled.changed() => {
                    // A dropped sender also ends the loop
                    if changed.is_err() || *cancelled.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    lock_ducker(&ducker).tick(dt);
                }
            }
        }
        debug!("ducker task stopped");
    });

    DuckerTask { cancel, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn loud(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect()
    }

    #[test]
    fn test_window_keeps_last_50ms() {
        let mut ducker = RealtimeDucker::new(DuckingParams::default(), 1000, 1.0);
        ducker.push_foreground(&loud(200));
        ducker.push_foreground(&vec![0.0; 50]);
        assert_eq!(ducker.foreground_level_db(), f32::NEG_INFINITY);

        ducker.push_foreground(&loud(10));
        assert_abs_diff_eq!(
            ducker.foreground_level_db(),
            linear_to_db(0.5 * (10.0_f32 / 50.0).sqrt()),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_ducks_then_recovers() {
        let params = DuckingParams::default();
        let mut ducker = RealtimeDucker::new(params, 1000, 1.0);
        ducker.push_foreground(&loud(50));
        for _ in 0..100 {
            ducker.tick(0.01);
        }
        assert_abs_diff_eq!(ducker.gain(), params.ducked_level(1.0), epsilon = 1e-3);

        ducker.push_foreground(&vec![0.0; 50]);
        for _ in 0..300 {
            ducker.tick(0.01);
        }
        assert_abs_diff_eq!(ducker.gain(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_attack_is_faster_than_release() {
        let mut ducker = RealtimeDucker::new(DuckingParams::default(), 1000, 1.0);
        ducker.push_foreground(&loud(50));
        let after_attack = ducker.tick(0.05);
        let drop = 1.0 - after_attack;

        ducker.push_foreground(&vec![0.0; 50]);
        let after_release = ducker.tick(0.05);
        let rise = after_release - after_attack;
        assert!(drop > rise);
    }

    #[test]
    fn test_process_background_applies_gain() {
        let mut ducker = RealtimeDucker::new(DuckingParams::default(), 1000, 0.5);
        let mut samples = vec![1.0; 4];
        ducker.process_background(&mut samples);
        assert_eq!(samples, vec![0.5; 4]);
        ducker.reset();
        assert_eq!(ducker.gain(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ticks_until_stopped() {
        let ducker: SharedDucker = Arc::new(Mutex::new(RealtimeDucker::new(
            DuckingParams::default(),
            1000,
            1.0,
        )));
        lock_ducker(&ducker).push_foreground(&loud(50));

        let task = spawn_ducker_task(Arc::clone(&ducker), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(lock_ducker(&ducker).gain() < 0.3);

        task.stop();
        task.join().await;
        let frozen = lock_ducker(&ducker).gain();
        lock_ducker(&ducker).push_foreground(&vec![0.0; 50]);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(lock_ducker(&ducker).gain(), frozen);
    }
}
