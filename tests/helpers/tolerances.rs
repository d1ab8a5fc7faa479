//! Tolerance constants for audio testing.
//!
//! Different checks need different precision levels.

/// Floating point rounding errors (for exact gain targets).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Largest gain change between two adjacent envelope steps of a fade at
/// volume 0.5. Anything bigger across an interrupt is a jump.
pub const GAIN_STEP_EPSILON: f32 = 0.02;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// RMS a sustained pad at volume 0.5 comfortably exceeds.
pub const AUDIBLE_RMS: f32 = 0.05;
