//! Next-frame coalescing and trailing-timer debouncing
//!
//! Heavy work (layout sync, recentering, height propagation, scale
//! correction) must never run inside an input handler. Handlers enqueue a
//! task key instead; the host calls [`FrameScheduler::take_frame`] once per
//! animation frame and [`FrameScheduler::take_due`] whenever its timer fires.
//!
//! Time is passed in explicitly so the host's clock drives everything and
//! tests stay deterministic.

use std::time::{Duration, Instant};

/// Trailing debounce applied to scale-change layout passes (~90ms)
pub const LAYOUT_DEBOUNCE: Duration = Duration::from_millis(90);

/// Coalescing scheduler for one viewer instance
///
/// Each key is queued at most once per frame and holds at most one pending
/// timer. After [`close`](Self::close) nothing is queued or returned again.
///
/// # Example
///
/// ```
/// use annotator_scheduler::frame::{FrameScheduler, LAYOUT_DEBOUNCE};
/// use std::time::{Duration, Instant};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Task { Layout, Recenter }
///
/// let mut scheduler = FrameScheduler::new();
/// scheduler.request_frame(Task::Recenter);
/// scheduler.request_frame(Task::Recenter);
/// assert_eq!(scheduler.take_frame(), vec![Task::Recenter]);
///
/// let start = Instant::now();
/// scheduler.debounce(Task::Layout, start, LAYOUT_DEBOUNCE);
/// scheduler.debounce(Task::Layout, start + Duration::from_millis(50), LAYOUT_DEBOUNCE);
/// assert!(scheduler.take_due(start + Duration::from_millis(100)).is_empty());
/// assert_eq!(scheduler.take_due(start + Duration::from_millis(140)), vec![Task::Layout]);
/// ```
#[derive(Debug, Clone)]
pub struct FrameScheduler<K> {
    /// Keys waiting for the next animation frame, in request order
    frame_queue: Vec<K>,

    /// Pending trailing timers and their deadlines
    timers: Vec<(K, Instant)>,

    /// Set by teardown
    closed: bool,
}

impl<K: Copy + Eq> FrameScheduler<K> {
    pub fn new() -> Self {
        Self {
            frame_queue: Vec::new(),
            timers: Vec::new(),
            closed: false,
        }
    }

    /// Queue `key` for the next animation frame
    ///
    /// Returns `true` when the key was newly queued, `false` when it was
    /// already pending (coalesced) or the scheduler is closed.
    pub fn request_frame(&mut self, key: K) -> bool {
        if self.closed || self.frame_queue.contains(&key) {
            return false;
        }
        self.frame_queue.push(key);
        true
    }

    /// Whether the host needs to request an animation frame
    pub fn has_frame_work(&self) -> bool {
        !self.frame_queue.is_empty()
    }

    /// Drain the keys queued for this frame
    ///
    /// Keys requested while the returned work runs land in the next frame.
    pub fn take_frame(&mut self) -> Vec<K> {
        std::mem::take(&mut self.frame_queue)
    }

    /// Arm (or re-arm) a trailing timer for `key`
    ///
    /// Every call pushes the deadline to `now + delay`, so a burst of calls
    /// fires once, `delay` after the last one.
    pub fn debounce(&mut self, key: K, now: Instant, delay: Duration) {
        if self.closed {
            return;
        }
        let deadline = now + delay;
        match self.timers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = deadline,
            None => self.timers.push((key, deadline)),
        }
    }

    /// Earliest pending deadline, for the host to arm its timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Remove and return every timer whose deadline has passed
    ///
    /// Returned in deadline order.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Instant)> = Vec::new();
        self.timers.retain(|(key, deadline)| {
            if *deadline <= now {
                due.push((*key, *deadline));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, deadline)| *deadline);
        due.into_iter().map(|(key, _)| key).collect()
    }

    /// Whether `key` is queued for a frame or has a pending timer
    pub fn is_pending(&self, key: K) -> bool {
        self.frame_queue.contains(&key) || self.timers.iter().any(|(k, _)| *k == key)
    }

    /// Cancel a single key in both queues
    pub fn cancel(&mut self, key: K) {
        self.frame_queue.retain(|k| *k != key);
        self.timers.retain(|(k, _)| *k != key);
    }

    /// Cancel everything and refuse further work
    ///
    /// Returns the number of callbacks that were still pending.
    pub fn close(&mut self) -> usize {
        let pending = self.frame_queue.len() + self.timers.len();
        self.frame_queue.clear();
        self.timers.clear();
        self.closed = true;
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<K: Copy + Eq> Default for FrameScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}
