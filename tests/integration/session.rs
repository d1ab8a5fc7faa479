//! Session integration tests
//!
//! Song switches, start/stop, resume and the click settle pause.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use setalight_audio::prelude::*;
use setalight_audio::core::{AudioGraph, GraphConfig, GraphState};
use setalight_audio::{Error, Fraction, MetronomeState, PadState};

/// Song A (C, 120, 4/4) fades in to 0.5 over 3s; switching to song B (D)
/// crossfades instead of cutting.
#[test]
fn test_song_switch_crossfades() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    assert_eq!(t.session.pads().state(), PadState::FadingIn);

    t.run_to(1500.0);
    let mid = t.pad_gain();
    assert!(mid > 0.0 && mid < 0.5, "mid fade gain {mid}");

    t.run_to(3000.0);
    assert_eq!(t.session.pads().state(), PadState::Playing);
    assert_abs_diff_eq!(t.pad_gain(), 0.5, epsilon = FLOAT_EPSILON);

    t.start(song("D", 120.0));
    let pads = t.session.pads();
    assert!(pads.is_crossfading());
    assert_eq!(pads.stream_count(), 2);
    // The old stream is still sounding: no hard cut.
    assert_abs_diff_eq!(pads.outgoing_gain().unwrap(), 0.5, epsilon = FLOAT_EPSILON);
    assert_eq!(t.session.active_song().unwrap().key, "D");

    t.run_to(12_000.0);
    let pads = t.session.pads();
    assert!(!pads.is_crossfading());
    assert_eq!(pads.stream_count(), 1);
    assert_eq!(pads.current_key().unwrap().name(), "D");
    assert_eq!(pads.state(), PadState::Playing);
}

/// Same tempo across the switch: the click keeps running on its grid.
#[test]
fn test_same_tempo_switch_keeps_click() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);
    let clicks = t.session.metronome().clicks_scheduled();

    t.start(song("D", 120.0));
    assert!(t.session.metronome().is_running());
    assert_eq!(t.session.click_restart_at(), None);
    assert_eq!(t.session.metronome().clicks_scheduled(), clicks);
}

#[test]
fn test_tempo_change_settles_before_restart() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(2000.0);

    t.start(song("C", 90.0));
    assert_eq!(t.session.metronome().state(), MetronomeState::Stopped);
    assert_eq!(t.session.click_restart_at(), Some(3000.0));
    // Same key: the pad is left alone.
    assert_eq!(t.session.pads().stream_count(), 1);
    assert!(!t.session.pads().is_crossfading());

    t.run_to(2990.0);
    assert!(!t.session.metronome().is_running());

    t.run_to(3000.0);
    let metronome = t.session.metronome();
    assert!(metronome.is_running());
    assert_abs_diff_eq!(
        metronome.timing().unwrap().interval_ms,
        60_000.0 / 90.0,
        epsilon = 1e-9
    );
    assert_abs_diff_eq!(
        metronome.next_beat_ms().unwrap(),
        3000.0 + 60_000.0 / 90.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_stop_during_settle_cancels_restart() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(500.0);
    t.start(song("C", 140.0));
    assert!(t.session.click_restart_at().is_some());

    t.session.on_stop_requested();
    assert_eq!(t.session.click_restart_at(), None);
    t.run_to(3000.0);
    assert!(!t.session.metronome().is_running());
}

#[test]
fn test_song_change_without_start_changes_nothing() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.session.on_song_changed(song("E", 100.0));
    t.run_to(6000.0);
    assert_eq!(t.session.active_song().unwrap().key, "C");
    assert_eq!(t.session.current_song().unwrap().key, "E");
    assert_eq!(t.session.pads().current_key().unwrap().name(), "C");
    assert_abs_diff_eq!(
        t.session.metronome().timing().unwrap().interval_ms,
        500.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_double_stop_is_a_no_op() {
    let mut t = TestSession::new();

    // Never started.
    t.session.on_stop_requested();
    t.session.on_stop_requested();
    assert!(t.drain_events().is_empty());

    t.start(song("C", 120.0));
    t.run_to(3000.0);
    t.drain_events();

    t.session.on_stop_requested();
    t.session.on_stop_requested();
    t.run_to(6000.0);

    let events = t.drain_events();
    assert_eq!(
        playback_states(&events, ChannelKind::Click),
        vec![PlaybackState::Stopped]
    );
    assert_eq!(
        playback_states(&events, ChannelKind::Pads),
        vec![PlaybackState::FadingOut, PlaybackState::Stopped]
    );
    assert_eq!(t.session.metronome().state(), MetronomeState::Stopped);
    assert_eq!(t.session.pads().state(), PadState::Loaded);
}

#[test]
fn test_resume_after_stop_reuses_loaded_pad() {
    let mut t = TestSession::new();
    t.start(song("G", 100.0));
    t.run_to(3000.0);
    t.session.on_stop_requested();
    t.run_to(6000.0);

    t.session.on_start_requested().unwrap();
    assert!(t.session.is_playing());
    assert!(!t.session.pads().has_pending_load());
    assert_eq!(t.session.pads().state(), PadState::FadingIn);
    assert_eq!(t.session.metronome().beat_cursor(), 1);

    t.run_to(9000.0);
    assert_abs_diff_eq!(t.pad_gain(), 0.5, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_missing_meter_refuses_click() {
    let mut t = TestSession::new();
    t.start(SongDescriptor::new("A").bpm(120.0));

    let events = t.drain_events();
    assert!(events.contains(&EngineEvent::ClickRefused));
    assert!(!t.session.metronome().is_running());
    assert_eq!(t.session.metronome().clicks_scheduled(), 0);
}

#[test]
fn test_refused_click_stops_previous_tempo() {
    let mut t = TestSession::new();
    t.start(song("A", 120.0));
    t.run_to(1000.0);
    assert!(t.session.metronome().is_running());

    t.start(SongDescriptor::new("A"));
    assert!(!t.session.metronome().is_running());
    assert!(t.drain_events().contains(&EngineEvent::ClickRefused));
}

#[test]
fn test_compound_meter_song_clicks_eighths() {
    let mut t = TestSession::new();
    t.start(
        SongDescriptor::new("E")
            .bpm(80.0)
            .tempo_note(Fraction::QUARTER)
            .time_signature(TimeSignature::new(6, 8).unwrap()),
    );
    t.run_to(1400.0);

    // Beats at 0, 250, ... 1500 (lookahead 100ms).
    assert_eq!(t.session.metronome().clicks_scheduled(), 7);
    assert_eq!(t.session.metronome().beat_cursor(), 1);
}

#[test]
fn test_click_grid_does_not_drift() {
    let mut t = TestSession::new();
    t.start(song("C", 128.0));
    t.run_to(5.0 * 60_000.0);

    let interval = 60_000.0 / 128.0;
    let metronome = t.session.metronome();
    let beats = metronome.clicks_scheduled() as f64;
    assert_abs_diff_eq!(
        metronome.next_beat_ms().unwrap(),
        beats * interval,
        epsilon = 1e-6
    );
}

/// An output that refuses its first start leaves the session untouched; the
/// next start request brings everything up.
#[test]
fn test_blocked_output_is_retried_on_next_start() {
    let graph = AudioGraph::new(GraphConfig {
        backend: BackendKind::Offline,
        sample_rate: TEST_SAMPLE_RATE as f64,
        suspended_starts: 1,
        ..GraphConfig::default()
    });
    let mut session = PlaybackSession::builder()
        .graph(graph)
        .provider(fixture_provider())
        .build()
        .expect("session");
    let events = session.subscribe();
    session.on_song_changed(song("C", 120.0));

    let err = session.on_start_requested().unwrap_err();
    assert!(matches!(&err, Error::Core(core) if core.is_retryable()), "{err}");
    assert_eq!(session.stage().graph().state(), GraphState::Idle);
    assert!(!session.is_playing());
    assert!(session.active_song().is_none());
    assert!(!session.metronome().is_running());
    assert!(!session.pads().has_pending_load());

    let blocked: Vec<_> = events.try_iter().collect();
    assert!(blocked
        .iter()
        .any(|e| matches!(e, EngineEvent::OutputBlocked(_))));

    session.on_start_requested().expect("second start");
    session.tick();
    assert_eq!(session.stage().graph().state(), GraphState::Running);
    assert!(session.is_playing());
    assert_eq!(session.active_song().unwrap().key, "C");
    assert_eq!(session.pads().state(), PadState::FadingIn);
    assert!(session.metronome().is_running());
}

/// The restart decision compares tempo metadata with the active song, not
/// the resulting interval.
#[test]
fn test_changed_tempo_note_settles_even_at_equal_interval() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(1000.0);

    t.start(song("C", 60.0).tempo_note(Fraction::new(1, 2)));
    assert_eq!(t.session.click_restart_at(), Some(2000.0));
    assert!(!t.session.metronome().is_running());

    t.run_to(2000.0);
    assert_abs_diff_eq!(
        t.session.metronome().timing().unwrap().interval_ms,
        500.0,
        epsilon = 1e-9
    );
}
