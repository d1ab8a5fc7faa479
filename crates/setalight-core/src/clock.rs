//! Time sources for envelope and beat scheduling.
//!
//! Everything that schedules against a deadline reads time through
//! [`AudioClock`]. The production clock is [`GraphClock`], which follows the
//! rendered sample position while the graph is producing audio, so beat
//! deadlines are measured on the same timeline the mixer places clicks on.

use crate::lockfree::AtomicDouble;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond time source.
pub trait AudioClock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicDouble>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Arc::new(AtomicDouble::new(start_ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) -> f64 {
        self.now.add(ms)
    }
}

impl AudioClock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Shared between [`GraphClock`] handles and the mixer.
#[derive(Debug)]
pub(crate) struct ClockShared {
    origin: Instant,
    rendering: AtomicBool,
    sample_rate: AtomicDouble,
    anchor_ms: AtomicDouble,
    anchor_sample: AtomicU64,
    position: AtomicU64,
    wall_offset_ms: AtomicDouble,
}

impl ClockShared {
    pub(crate) fn new(sample_rate: f64) -> Self {
        Self {
            origin: Instant::now(),
            rendering: AtomicBool::new(false),
            sample_rate: AtomicDouble::new(sample_rate),
            anchor_ms: AtomicDouble::new(0.0),
            anchor_sample: AtomicU64::new(0),
            position: AtomicU64::new(0),
            wall_offset_ms: AtomicDouble::new(0.0),
        }
    }

    fn wall_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0 + self.wall_offset_ms.get()
    }

    pub(crate) fn now_ms(&self) -> f64 {
        if self.rendering.load(Ordering::Acquire) {
            let rendered = self
                .position
                .load(Ordering::Acquire)
                .saturating_sub(self.anchor_sample.load(Ordering::Acquire));
            self.anchor_ms.get() + rendered as f64 * 1000.0 / self.sample_rate.get()
        } else {
            self.wall_ms()
        }
    }

    /// Switch to sample-position time, continuing from the current reading.
    pub(crate) fn begin_rendering(&self, sample_rate: f64) {
        let now = self.now_ms();
        self.sample_rate.set(sample_rate);
        self.anchor_ms.set(now);
        self.anchor_sample
            .store(self.position.load(Ordering::Acquire), Ordering::Release);
        self.rendering.store(true, Ordering::Release);
    }

    /// Fall back to wall time without stepping backwards.
    pub(crate) fn end_rendering(&self) {
        let now = self.now_ms();
        self.rendering.store(false, Ordering::Release);
        let wall = self.origin.elapsed().as_secs_f64() * 1000.0;
        self.wall_offset_ms.set((now - wall).max(0.0));
    }

    pub(crate) fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn advance(&self, frames: u64) {
        self.position.fetch_add(frames, Ordering::AcqRel);
    }

    /// Sample index at which `ms` falls on the rendering timeline.
    #[inline]
    pub(crate) fn ms_to_sample(&self, ms: f64) -> u64 {
        let delta_ms = (ms - self.anchor_ms.get()).max(0.0);
        self.anchor_sample.load(Ordering::Acquire)
            + (delta_ms * self.sample_rate.get() / 1000.0).round() as u64
    }
}

/// Clock handle backed by the audio graph.
#[derive(Debug, Clone)]
pub struct GraphClock {
    pub(crate) shared: Arc<ClockShared>,
}

impl GraphClock {
    pub(crate) fn new(shared: Arc<ClockShared>) -> Self {
        Self { shared }
    }

    /// True while time is derived from rendered samples.
    pub fn is_sample_accurate(&self) -> bool {
        self.shared.is_rendering()
    }
}

impl AudioClock for GraphClock {
    fn now_ms(&self) -> f64 {
        self.shared.now_ms()
    }
}
