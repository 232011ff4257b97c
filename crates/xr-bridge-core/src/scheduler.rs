//! Animation-frame primitives that drive session frame loops
//!
//! A [`FrameScheduler`] hands out one-shot frame requests. Hosts with a
//! vsync callback drive a [`ManualScheduler`] from it; headless hosts use
//! [`spawn_interval_driver`] as a timer fallback.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Work scheduled for the next frame; receives the frame timestamp in ms
pub type FrameTask = Box<dyn FnOnce(f64) + Send>;

/// Handle for a pending frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(u64);

/// The host's per-frame scheduling primitive
pub trait FrameScheduler: Send + Sync {
    /// Run `task` once on the next frame
    fn request_animation_frame(&self, task: FrameTask) -> FrameRequestId;

    /// Drop a pending request; unknown or already-run ids are ignored
    fn cancel_animation_frame(&self, id: FrameRequestId);
}

/// Which ticks of a frame loop reach the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePacing {
    #[default]
    EveryFrame,
    /// Run ticks 0, 2, 4, ... for backends that cannot keep up with the host
    EveryOtherFrame,
}

impl FramePacing {
    pub fn should_run(self, tick: u64) -> bool {
        match self {
            FramePacing::EveryFrame => true,
            FramePacing::EveryOtherFrame => tick % 2 == 0,
        }
    }
}

/// Scheduler whose frames are produced by explicit [`ManualScheduler::run_frame`] calls
pub struct ManualScheduler {
    next_id: AtomicU64,
    pending: Mutex<Vec<(FrameRequestId, FrameTask)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Run every task requested before this call, in request order.
    ///
    /// Tasks requested while the frame runs are deferred to the next frame.
    /// If a task panics, the tasks after it go back to the front of the
    /// queue before the panic continues. Returns how many tasks ran.
    pub fn run_frame(&self, timestamp: f64) -> usize {
        let tasks = std::mem::take(&mut *self.pending.lock());
        let mut batch = Requeue {
            pending: &self.pending,
            rest: tasks.into_iter(),
        };
        let mut count = 0;
        while let Some((_, task)) = batch.rest.next() {
            count += 1;
            task(timestamp);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Puts a frame's unexecuted tasks back ahead of newer requests on unwind
struct Requeue<'a> {
    pending: &'a Mutex<Vec<(FrameRequestId, FrameTask)>>,
    rest: std::vec::IntoIter<(FrameRequestId, FrameTask)>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let rest: Vec<_> = self.rest.by_ref().collect();
        if !rest.is_empty() {
            let mut pending = self.pending.lock();
            let newer = std::mem::replace(&mut *pending, rest);
            pending.extend(newer);
        }
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_animation_frame(&self, task: FrameTask) -> FrameRequestId {
        let id = FrameRequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().push((id, task));
        id
    }

    fn cancel_animation_frame(&self, id: FrameRequestId) {
        self.pending.lock().retain(|(pending, _)| *pending != id);
    }
}

/// Drive `scheduler` from a tokio interval, stamping frames with the
/// milliseconds elapsed since the driver started.
///
/// A panicking frame task is logged and the driver keeps going.
pub fn spawn_interval_driver(scheduler: Arc<ManualScheduler>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let timestamp = started.elapsed().as_secs_f64() * 1000.0;
            match std::panic::catch_unwind(AssertUnwindSafe(|| scheduler.run_frame(timestamp))) {
                Ok(ran) => tracing::trace!(timestamp, ran, "frame"),
                Err(_) => tracing::error!(timestamp, "frame task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_run_frame_runs_each_request_once() {
        let scheduler = ManualScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        scheduler.request_animation_frame(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(scheduler.run_frame(16.0), 1);
        assert_eq!(scheduler.run_frame(32.0), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel() {
        let scheduler = ManualScheduler::new();
        let id = scheduler.request_animation_frame(Box::new(|_| panic!("cancelled task ran")));
        scheduler.cancel_animation_frame(id);
        scheduler.cancel_animation_frame(id);
        assert_eq!(scheduler.run_frame(0.0), 0);
    }

    #[test]
    fn test_requests_during_frame_wait_for_next_frame() {
        let scheduler = Arc::new(ManualScheduler::new());
        let inner = scheduler.clone();
        scheduler.request_animation_frame(Box::new(move |_| {
            inner.request_animation_frame(Box::new(|_| {}));
        }));

        assert_eq!(scheduler.run_frame(0.0), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_panicking_task_requeues_the_rest() {
        let scheduler = ManualScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        scheduler.request_animation_frame(Box::new(|_| panic!("task failed")));
        scheduler.request_animation_frame(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let unwound =
            std::panic::catch_unwind(AssertUnwindSafe(|| scheduler.run_frame(0.0))).is_err();
        assert!(unwound);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.run_frame(16.0), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_every_other_frame() {
        let ran: Vec<u64> = (0..6).filter(|t| FramePacing::EveryOtherFrame.should_run(*t)).collect();
        assert_eq!(ran, vec![0, 2, 4]);
        assert!((0..6).all(|t| FramePacing::EveryFrame.should_run(t)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_driver_runs_frames() {
        let scheduler = Arc::new(ManualScheduler::new());
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let sink = stamps.clone();
        scheduler.request_animation_frame(Box::new(move |ts| sink.lock().push(ts)));

        let driver = spawn_interval_driver(scheduler.clone(), Duration::from_millis(16));
        tokio::time::sleep(Duration::from_millis(40)).await;
        driver.abort();

        assert_eq!(stamps.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_driver_survives_panicking_task() {
        let scheduler = Arc::new(ManualScheduler::new());
        scheduler.request_animation_frame(Box::new(|_| panic!("task failed")));
        let driver = spawn_interval_driver(scheduler.clone(), Duration::from_millis(16));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stamps = Arc::new(Mutex::new(Vec::new()));
        let sink = stamps.clone();
        scheduler.request_animation_frame(Box::new(move |ts| sink.lock().push(ts)));
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!driver.is_finished());
        driver.abort();
        assert_eq!(stamps.lock().len(), 1);
    }
}
