//! # Live Session
//!
//! Play a short scripted setlist through the default output device: pads fade
//! in, crossfade between keys, and the click restarts when the tempo changes.
//!
//! Pass a directory laid out as `<dir>/<pad set>/<key>.wav` to use real pads;
//! without one, sine drones stand in.
//!
//! ```bash
//! RUST_LOG=setalight_audio=debug cargo run --example live_session -- [pad dir]
//! ```

use setalight_audio::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SETLIST: &[(&str, &str, f64, (u8, u8))] = &[
    ("Opener", "C", 120.0, (4, 4)),
    ("Ballad", "G", 72.0, (6, 8)),
    ("Closer", "D", 128.0, (4, 4)),
];

fn main() -> setalight_audio::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig {
        backend: BackendKind::Device,
        ..EngineConfig::default()
    };

    let builder = PlaybackSession::builder().config(config.clone());
    let builder = match std::env::args().nth(1) {
        Some(dir) => builder.provider(CachedProvider::new(AssetPadProvider::new(dir), 4)),
        None => {
            let tones = StaticProvider::new();
            for (_, key, _, _) in SETLIST {
                tones.insert_tone(&config.pad_set, key, 8.0, 48_000)?;
            }
            builder.provider(tones)
        }
    };

    let handle = SessionDriver::spawn(builder.build()?)?;
    let events = handle.subscribe();
    std::thread::spawn(move || {
        for event in events {
            println!("  {event:?}");
        }
    });

    for &(title, key, bpm, (beats, unit)) in SETLIST {
        let song = SongDescriptor::new(key)
            .title(title)
            .bpm(bpm)
            .time_signature(TimeSignature::new(beats, unit)?);
        println!("{title}: {key} at {bpm} bpm, {beats}/{unit}");
        handle.song_changed(song)?;
        handle.start()?;
        std::thread::sleep(Duration::from_secs(12));
    }

    println!("Click off, pads only");
    handle.toggle_click()?;
    std::thread::sleep(Duration::from_secs(4));

    handle.stop()?;
    std::thread::sleep(Duration::from_millis(config.fade_out_ms as u64 + 500));
    handle.shutdown();
    Ok(())
}
