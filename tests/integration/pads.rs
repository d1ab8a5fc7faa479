//! Pad integration tests
//!
//! Interrupted fades, crossfade timing and pad load failures, driven through
//! the session.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use setalight_audio::prelude::*;
use setalight_audio::PadState;

/// Sample the pad gain at every tick for `ms`.
fn gain_trace(t: &mut TestSession, ms: f64) -> Vec<f32> {
    let end = t.now() + ms;
    let mut trace = vec![t.pad_gain()];
    while t.now() < end {
        t.run_for(TICK_MS);
        trace.push(t.pad_gain());
    }
    trace
}

fn max_jump(trace: &[f32]) -> f32 {
    trace
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f32::max)
}

#[test]
fn test_fade_in_during_fade_out_resumes_from_current_gain() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.session.on_stop_requested();
    t.run_to(4500.0);
    let g = t.pad_gain();
    assert!(g > 0.0 && g < 0.5, "gain mid fade-out {g}");

    t.session.on_start_requested().unwrap();
    assert_eq!(t.session.pads().state(), PadState::FadingIn);
    assert_eq!(t.session.pads().stream_count(), 1);

    let trace = gain_trace(&mut t, 3000.0);
    assert_abs_diff_eq!(trace[0], g, epsilon = FLOAT_EPSILON);
    assert!(max_jump(&trace) < GAIN_STEP_EPSILON, "jump {}", max_jump(&trace));
    assert!(trace.windows(2).all(|w| w[1] >= w[0]));
    assert_abs_diff_eq!(*trace.last().unwrap(), 0.5, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_pads_toggle_off_mid_fade_in_reverses_immediately() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(1500.0);
    let g = t.pad_gain();

    t.session.on_pads_toggle();
    assert_eq!(t.session.pads().state(), PadState::FadingOut);

    let trace = gain_trace(&mut t, 3000.0);
    assert_abs_diff_eq!(trace[0], g, epsilon = FLOAT_EPSILON);
    assert!(max_jump(&trace) < GAIN_STEP_EPSILON);
    assert!(trace.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(t.session.pads().state(), PadState::Loaded);
    assert_eq!(t.pad_gain(), 0.0);

    // Back on: same stream, no reload.
    t.session.on_pads_toggle();
    assert!(!t.session.pads().has_pending_load());
    assert_eq!(t.session.pads().state(), PadState::FadingIn);
}

#[test]
fn test_crossfade_takes_out_plus_in_minus_overlap() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.start(song("D", 120.0));
    let start = t.now();
    assert_eq!(t.session.pads().crossfade_ends_at(), Some(start + 9000.0));

    // Overlap window is [start + 4000, start + 5000].
    t.run_to(start + 4500.0);
    let pads = t.session.pads();
    assert!(pads.outgoing_gain().unwrap() > 0.0);
    assert!(pads.current_gain().unwrap() > 0.0);

    t.run_to(start + 8990.0);
    assert!(t.session.pads().is_crossfading());

    t.run_to(start + 9000.0);
    assert!(!t.session.pads().is_crossfading());
    assert_abs_diff_eq!(t.pad_gain(), 0.5, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_crossfade_durations_follow_config() {
    let config = EngineConfig {
        crossfade_out_ms: 2000.0,
        crossfade_in_ms: 4000.0,
        crossfade_overlap_ms: 500.0,
        ..EngineConfig::default()
    };
    let mut t = TestSession::build(config, GlobalSettings::default());
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.start(song("E", 120.0));
    assert_eq!(t.session.pads().crossfade_ends_at(), Some(3000.0 + 5500.0));

    // The new stream waits until 500ms before the old one is silent.
    t.run_to(4490.0);
    assert_eq!(t.session.pads().current_gain(), Some(0.0));
    t.run_to(8500.0);
    assert!(!t.session.pads().is_crossfading());
}

#[test]
fn test_start_mid_crossfade_is_deferred() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);
    t.start(song("D", 120.0));
    t.run_to(5000.0);

    t.start(song("E", 120.0));
    assert!(t.session.is_start_deferred());
    assert_eq!(t.session.active_song().unwrap().key, "D");
    assert_eq!(t.session.pads().stream_count(), 2);

    t.run_to(12_000.0);
    assert!(!t.session.is_start_deferred());
    assert_eq!(t.session.active_song().unwrap().key, "E");
    assert!(t.session.pads().is_crossfading());
    // Never more than the two streams of one crossfade.
    assert_eq!(t.session.pads().stream_count(), 2);

    t.run_to(21_000.0);
    assert_eq!(t.session.pads().current_key().unwrap().name(), "E");
    assert_eq!(t.session.pads().stream_count(), 1);
}

#[test]
fn test_pads_off_during_crossfade_keeps_incoming_stream() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);
    t.start(song("D", 120.0));
    t.run_to(7500.0);

    t.session.on_pads_toggle();
    assert!(!t.session.pads().is_crossfading());
    t.run_to(11_000.0);

    let pads = t.session.pads();
    assert_eq!(pads.stream_count(), 1);
    assert_eq!(pads.current_key().unwrap().name(), "D");
    assert_eq!(pads.state(), PadState::Loaded);
    assert_eq!(t.session.stage().graph().channel_count(), 2);
}

#[test]
fn test_load_failure_clears_pads_toggle() {
    let mut t = TestSession::new();
    t.start(song("F#", 120.0));

    let events = t.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::PadLoadFailed { key, .. } if key == "F#")));
    assert!(events.contains(&EngineEvent::ToggleChanged(ToggleState {
        pads_on: false,
        click_on: true,
    })));
    assert!(!t.session.toggles().pads_on);
    assert_eq!(t.session.pads().state(), PadState::NoStream);
    // The click is unaffected.
    assert!(t.session.metronome().is_running());

    // Later songs stay silent until the user turns pads back on.
    t.start(song("C", 120.0));
    assert_eq!(t.session.pads().state(), PadState::NoStream);
}

#[test]
fn test_crossfade_to_unloadable_key_fades_old_out() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.start(song("Bb", 120.0));
    assert!(!t.session.pads().is_crossfading());
    assert_eq!(t.session.pads().state(), PadState::FadingOut);
    assert!(!t.session.toggles().pads_on);

    t.run_to(6000.0);
    assert_eq!(t.session.pads().stream_count(), 1);
    assert_eq!(t.pad_gain(), 0.0);
}

#[test]
fn test_volume_change_while_playing_and_fading() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(1000.0);

    t.session.set_pad_volume(0.8);
    t.run_to(3000.0);
    assert_abs_diff_eq!(t.pad_gain(), 0.8, epsilon = FLOAT_EPSILON);

    t.session.set_pad_volume(0.25);
    assert_abs_diff_eq!(t.pad_gain(), 0.25, epsilon = FLOAT_EPSILON);
    assert_eq!(t.session.volume_prefs().pad_volume, 0.25);
}
