//! Per-sample gain smoothing.
//!
//! Envelope ramps move a channel's gain in discrete steps from the control
//! thread. The mixer feeds each new step into a [`SmoothedGain`] so the jump
//! between two steps is spread across a few milliseconds of samples instead
//! of landing on a single sample boundary.
//!
//! # Example
//!
//! ```
//! use setalight_core::SmoothedGain;
//!
//! // 5ms smoothing at 48kHz
//! let mut gain = SmoothedGain::new(0.0, 0.005, 48000.0);
//! gain.set_target(0.5);
//!
//! # let mut buffer = [1.0f32; 512];
//! for sample in buffer.iter_mut() {
//!     *sample *= gain.next_sample();
//! }
//! ```

/// Linearly smoothed gain value.
#[derive(Debug, Clone)]
pub struct SmoothedGain {
    current: f32,
    target: f32,
    step: f32,
    samples_remaining: u32,
    smooth_samples: u32,
}

impl SmoothedGain {
    pub fn new(initial: f32, smooth_time_secs: f32, sample_rate: f32) -> Self {
        let smooth_samples = (smooth_time_secs * sample_rate).max(1.0) as u32;

        Self {
            current: initial,
            target: initial,
            step: 0.0,
            samples_remaining: 0,
            smooth_samples,
        }
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < f32::EPSILON {
            return;
        }

        self.target = target;
        self.samples_remaining = self.smooth_samples;
        self.step = (self.target - self.current) / self.samples_remaining as f32;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.samples_remaining = 0;
    }

    /// Call once per sample in the audio callback.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.samples_remaining > 0 {
            self.current += self.step;
            self.samples_remaining -= 1;

            // Snap to target when done to avoid floating point drift
            if self.samples_remaining == 0 {
                self.current = self.target;
            }
        }

        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.samples_remaining > 0
    }
}

impl Default for SmoothedGain {
    fn default() -> Self {
        Self::new(0.0, 0.005, 48000.0)
    }
}
