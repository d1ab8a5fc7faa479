//! Settings integration tests
//!
//! Globally disabled channels, forced toggles and stereo split routing.

use crate::helpers::*;
use setalight_audio::prelude::*;
use setalight_audio::{PadState, StereoMode};

fn only_pads() -> GlobalSettings {
    GlobalSettings {
        metronome_enabled: false,
        ..GlobalSettings::default()
    }
}

#[test]
fn test_disabling_metronome_stops_it_and_forces_pads_on() {
    let mut t = TestSession::new();
    t.session.on_pads_toggle();
    t.start(song("C", 120.0));
    assert!(!t.session.toggles().pads_on);
    assert!(t.session.metronome().is_running());

    t.session.on_settings_changed(only_pads());
    assert!(!t.session.metronome().is_running());
    assert!(t.session.toggles().pads_on);
    // Forced on while playing: pads come up.
    t.session.tick();
    assert_eq!(t.session.pads().state(), PadState::FadingIn);

    let events = t.drain_events();
    assert!(events.contains(&EngineEvent::ToggleChanged(ToggleState {
        pads_on: true,
        click_on: true,
    })));
}

#[test]
fn test_forced_toggle_ignores_user_toggle() {
    let mut t = TestSession::with_settings(only_pads());
    t.start(song("C", 120.0));
    t.drain_events();

    t.session.on_pads_toggle();
    assert!(t.session.toggles().pads_on);
    assert!(t.drain_events().is_empty());

    // The disabled channel's toggle still flips but never sounds.
    t.session.on_click_toggle();
    t.session.on_click_toggle();
    assert!(!t.session.metronome().is_running());
}

#[test]
fn test_disabling_pads_cuts_them_at_once() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    t.run_to(3000.0);

    t.session.on_settings_changed(GlobalSettings {
        pads_enabled: false,
        ..GlobalSettings::default()
    });
    t.session.tick();
    assert_eq!(t.session.pads().state(), PadState::Loaded);
    assert_eq!(t.pad_gain(), 0.0);
    assert!(t.session.metronome().is_running());
}

#[test]
fn test_reenabling_a_channel_while_playing_starts_it() {
    let mut t = TestSession::with_settings(only_pads());
    t.start(song("C", 120.0));
    assert!(!t.session.metronome().is_running());

    t.session.on_settings_changed(GlobalSettings::default());
    assert!(t.session.metronome().is_running());
}

#[test]
fn test_settings_while_stopped_do_not_start_anything() {
    let mut t = TestSession::with_settings(only_pads());
    t.session.on_song_changed(song("C", 120.0));
    t.session.on_settings_changed(GlobalSettings::default());
    t.session.tick();
    assert!(!t.session.metronome().is_running());
    assert_eq!(t.session.pads().state(), PadState::NoStream);
}

#[test]
fn test_stereo_split_routes_pads_left_and_click_right() {
    let mut t = TestSession::new();
    t.start(song("C", 120.0));
    let split = GlobalSettings {
        stereo_split_enabled: true,
        ..GlobalSettings::default()
    };
    t.session.on_settings_changed(split);

    let graph = t.session.stage().graph();
    let pad = t.session.pads().current_channel().unwrap();
    let click = t.session.metronome().channel_id().unwrap();
    assert_eq!(graph.channel_mode(pad), Some(StereoMode::Left));
    assert_eq!(graph.channel_mode(click), Some(StereoMode::Right));

    // Streams opened later inherit the pad route.
    t.run_to(3000.0);
    t.start(song("D", 120.0));
    let incoming = t.session.pads().current_channel().unwrap();
    assert_ne!(incoming, pad);
    assert_eq!(
        t.session.stage().graph().channel_mode(incoming),
        Some(StereoMode::Left)
    );

    t.session.on_settings_changed(GlobalSettings::default());
    let graph = t.session.stage().graph();
    assert_eq!(graph.channel_mode(incoming), Some(StereoMode::Both));
    assert_eq!(graph.channel_mode(click), Some(StereoMode::Both));
}
