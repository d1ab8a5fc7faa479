//! Driver integration tests
//!
//! The session on its own thread, timed by the wall clock.

use crate::helpers::*;
use crossbeam_channel::Receiver;
use setalight_audio::prelude::*;
use setalight_audio::{Error, LoadExecutor, PadState};
use std::time::{Duration, Instant};

fn fast_config() -> EngineConfig {
    EngineConfig {
        backend: BackendKind::Null,
        fade_in_ms: 100.0,
        fade_out_ms: 100.0,
        crossfade_out_ms: 150.0,
        crossfade_in_ms: 150.0,
        crossfade_overlap_ms: 50.0,
        click_settle_ms: 50.0,
        driver_idle_ms: 5,
        ..EngineConfig::default()
    }
}

fn spawn(executor: LoadExecutor) -> SessionHandle {
    let session = PlaybackSession::builder()
        .config(fast_config())
        .provider(fixture_provider())
        .executor(executor)
        .build()
        .expect("session");
    SessionDriver::spawn(session).expect("driver")
}

/// Wait for `wanted` on `events`, giving up after two seconds.
fn wait_for(events: &Receiver<EngineEvent>, wanted: &EngineEvent) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(left) {
            Ok(event) if &event == wanted => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

fn pads(state: PlaybackState) -> EngineEvent {
    EngineEvent::Playback {
        channel: ChannelKind::Pads,
        state,
    }
}

#[test]
fn test_driver_fades_pads_in_and_out() {
    let handle = spawn(LoadExecutor::Inline);
    let events = handle.subscribe();

    handle.song_changed(song("C", 120.0)).unwrap();
    handle.start().unwrap();
    assert!(wait_for(&events, &pads(PlaybackState::Playing)));

    handle.stop().unwrap();
    assert!(wait_for(&events, &pads(PlaybackState::Stopped)));

    let state = handle.inspect(|s| s.pads().state()).unwrap();
    assert_eq!(state, PadState::Loaded);
    handle.shutdown();
}

#[test]
fn test_driver_with_threaded_loads_crossfades() {
    let handle = spawn(LoadExecutor::Threaded);
    let events = handle.subscribe();

    handle.song_changed(song("C", 120.0)).unwrap();
    handle.start().unwrap();
    assert!(wait_for(&events, &pads(PlaybackState::Playing)));

    handle.song_changed(song("D", 120.0)).unwrap();
    handle.start().unwrap();
    assert!(wait_for(&events, &pads(PlaybackState::FadingIn)));
    assert!(wait_for(&events, &pads(PlaybackState::Playing)));

    let (key, streams) = handle
        .inspect(|s| {
            let pads = s.pads();
            (pads.current_key().map(|k| k.name()), pads.stream_count())
        })
        .unwrap();
    assert_eq!(key, Some("D"));
    assert_eq!(streams, 1);
}

#[test]
fn test_dropping_last_handle_disposes_session() {
    let handle = spawn(LoadExecutor::Inline);
    let events = handle.subscribe();
    handle.song_changed(song("C", 120.0)).unwrap();
    handle.start().unwrap();
    assert!(wait_for(&events, &pads(PlaybackState::Playing)));

    let clone = handle.clone();
    drop(handle);
    assert!(clone.is_running());
    drop(clone);

    // Disposal reports the pads as stopped; then the notifier goes away.
    assert!(wait_for(&events, &pads(PlaybackState::Stopped)));
}

#[test]
fn test_commands_after_shutdown_fail() {
    let handle = spawn(LoadExecutor::Inline);
    handle.shutdown();
    handle.shutdown();
    assert!(!handle.is_running());
    assert!(matches!(handle.start(), Err(Error::DriverStopped)));
    assert!(matches!(
        handle.set_pad_volume(0.3),
        Err(Error::DriverStopped)
    ));
}
