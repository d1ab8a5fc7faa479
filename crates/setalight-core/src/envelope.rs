//! Fade and crossfade envelopes.
//!
//! A ramp drives one [`GainNode`] from its current value to a target over a
//! fixed duration. Ramps are sampled in [`DEFAULT_RAMP_STEPS`] discrete steps
//! on the control thread instead of handing a linear ramp to the mixer, so
//! two ramps with independent curves can run on one timeline (crossfades) and
//! a ramp can always begin from whatever gain the node holds right now.
//!
//! Each gain node carries at most one ramp. Scheduling a ramp on a node that
//! is already ramping cancels the old ramp first; the new one starts from the
//! last sampled value, so reversing a fade never jumps.
//!
//! Time only moves through [`EnvelopeScheduler::advance`], which the owner
//! calls with the audio clock's current time.

use crate::graph::{ChannelId, GainNode};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Reference granularity of a ramp.
pub const DEFAULT_RAMP_STEPS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    #[default]
    Linear,
    /// `p²`: slow start. Used for fade-ins.
    EaseIn,
    /// `1 - (1 - p)²`: fast start. Used for fade-outs.
    EaseOut,
}

impl Curve {
    #[inline]
    pub fn apply(self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            Curve::Linear => p,
            Curve::EaseIn => p * p,
            Curve::EaseOut => 1.0 - (1.0 - p) * (1.0 - p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RampId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStatus {
    /// Scheduled with a start time still in the future.
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl RampStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RampStatus::Pending,
            1 => RampStatus::Running,
            2 => RampStatus::Completed,
            _ => RampStatus::Cancelled,
        }
    }
}

/// Cancellable handle to a scheduled ramp.
///
/// Cancelling is cooperative: the scheduler stops applying steps and the
/// node keeps its last sampled gain.
#[derive(Debug, Clone)]
pub struct RampHandle {
    id: RampId,
    node: ChannelId,
    status: Arc<AtomicU8>,
}

impl RampHandle {
    pub fn id(&self) -> RampId {
        self.id
    }

    pub fn node(&self) -> ChannelId {
        self.node
    }

    pub fn status(&self) -> RampStatus {
        RampStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status(), RampStatus::Pending | RampStatus::Running)
    }

    pub fn is_completed(&self) -> bool {
        self.status() == RampStatus::Completed
    }

    /// Returns false if the ramp had already finished or been cancelled.
    pub fn cancel(&self) -> bool {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            if !matches!(
                RampStatus::from_u8(current),
                RampStatus::Pending | RampStatus::Running
            ) {
                return false;
            }
            match self.status.compare_exchange(
                current,
                RampStatus::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Reported by [`EnvelopeScheduler::advance`] when a ramp reaches its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampCompletion {
    pub id: RampId,
    pub node: ChannelId,
    pub value: f32,
}

#[derive(Debug)]
struct Ramp {
    id: RampId,
    status: Arc<AtomicU8>,
    gain: GainNode,
    /// Captured when the first step is due.
    from: Option<f32>,
    target: f32,
    start_ms: f64,
    duration_ms: f64,
    curve: Curve,
    applied_steps: u32,
}

impl Ramp {
    fn is_cancelled(&self) -> bool {
        RampStatus::from_u8(self.status.load(Ordering::Acquire)) == RampStatus::Cancelled
    }

    fn next_step_ms(&self, steps: u32) -> f64 {
        if self.from.is_none() || self.duration_ms <= 0.0 {
            return self.start_ms;
        }
        self.start_ms + self.duration_ms * (self.applied_steps + 1) as f64 / steps as f64
    }
}

/// Drives stepped gain ramps against an external clock.
#[derive(Debug)]
pub struct EnvelopeScheduler {
    ramps: BTreeMap<ChannelId, Ramp>,
    steps: u32,
    next_id: u64,
}

impl EnvelopeScheduler {
    pub fn new() -> Self {
        Self::with_steps(DEFAULT_RAMP_STEPS)
    }

    pub fn with_steps(steps: u32) -> Self {
        Self {
            ramps: BTreeMap::new(),
            steps: steps.max(1),
            next_id: 0,
        }
    }

    /// Ramp `gain` to `target` starting now.
    pub fn ramp_to(
        &mut self,
        gain: &GainNode,
        target: f32,
        duration_ms: f64,
        curve: Curve,
        now_ms: f64,
    ) -> RampHandle {
        self.ramp_at(gain, target, duration_ms, curve, now_ms, now_ms)
    }

    /// Ramp `gain` to `target`, beginning at `start_ms`.
    ///
    /// A ramp whose start lies in the future leaves the node untouched until
    /// then and picks up whatever value the node holds at that moment.
    pub fn ramp_at(
        &mut self,
        gain: &GainNode,
        target: f32,
        duration_ms: f64,
        curve: Curve,
        start_ms: f64,
        now_ms: f64,
    ) -> RampHandle {
        self.cancel(gain.id());

        let id = RampId(self.next_id);
        self.next_id += 1;

        let started = start_ms <= now_ms;
        let status = Arc::new(AtomicU8::new(if started {
            RampStatus::Running as u8
        } else {
            RampStatus::Pending as u8
        }));

        self.ramps.insert(
            gain.id(),
            Ramp {
                id,
                status: Arc::clone(&status),
                gain: gain.clone(),
                from: started.then(|| gain.get()),
                target,
                start_ms,
                duration_ms: duration_ms.max(0.0),
                curve,
                applied_steps: 0,
            },
        );

        RampHandle {
            id,
            node: gain.id(),
            status,
        }
    }

    /// Stop the ramp on `node`, leaving the gain where it is.
    pub fn cancel(&mut self, node: ChannelId) -> bool {
        match self.ramps.remove(&node) {
            Some(ramp) => {
                ramp.status
                    .store(RampStatus::Cancelled as u8, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_ramping(&self, node: ChannelId) -> bool {
        self.ramps
            .get(&node)
            .is_some_and(|ramp| !ramp.is_cancelled())
    }

    /// Change where the ramp on `node` ends without touching its timing.
    pub fn retarget(&mut self, node: ChannelId, target: f32) -> bool {
        match self.ramps.get_mut(&node) {
            Some(ramp) if !ramp.is_cancelled() => {
                ramp.target = target;
                true
            }
            _ => false,
        }
    }

    /// Target of the ramp on `node`, if any.
    pub fn target(&self, node: ChannelId) -> Option<f32> {
        self.ramps.get(&node).map(|ramp| ramp.target)
    }

    /// Time left until the ramp on `node` completes.
    pub fn remaining_ms(&self, node: ChannelId, now_ms: f64) -> Option<f64> {
        self.ramps
            .get(&node)
            .map(|ramp| (ramp.start_ms + ramp.duration_ms - now_ms).max(0.0))
    }

    /// Earliest time at which [`advance`](Self::advance) has work to do.
    pub fn next_deadline(&self) -> Option<f64> {
        self.ramps
            .values()
            .map(|ramp| ramp.next_step_ms(self.steps))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Apply every step due at `now_ms`. Returns the ramps that finished.
    pub fn advance(&mut self, now_ms: f64) -> Vec<RampCompletion> {
        let steps = self.steps;
        let mut completed = Vec::new();

        self.ramps.retain(|node, ramp| {
            if ramp.is_cancelled() {
                return false;
            }
            if now_ms < ramp.start_ms {
                return true;
            }

            let from = *ramp.from.get_or_insert_with(|| {
                ramp.status
                    .store(RampStatus::Running as u8, Ordering::Release);
                ramp.gain.get()
            });

            let due = if ramp.duration_ms <= 0.0 {
                steps
            } else {
                let progress = (now_ms - ramp.start_ms) / ramp.duration_ms;
                ((progress * steps as f64).floor() as u32).min(steps)
            };

            if due > ramp.applied_steps {
                ramp.applied_steps = due;
                let shaped = ramp.curve.apply(due as f64 / steps as f64);
                ramp.gain
                    .set(from + (ramp.target - from) * shaped as f32);
            }

            if ramp.applied_steps >= steps {
                ramp.gain.set(ramp.target);
                ramp.status
                    .store(RampStatus::Completed as u8, Ordering::Release);
                completed.push(RampCompletion {
                    id: ramp.id,
                    node: *node,
                    value: ramp.target,
                });
                return false;
            }
            true
        });

        completed
    }

    pub fn clear(&mut self) {
        let nodes: Vec<ChannelId> = self.ramps.keys().copied().collect();
        for node in nodes {
            self.cancel(node);
        }
    }
}

impl Default for EnvelopeScheduler {
    fn default() -> Self {
        Self::new()
    }
}
