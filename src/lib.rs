//! # Setalight Audio - Live Pad and Metronome Engine
//!
//! Plays a sustained pad bed in the song's key and a click track at the
//! song's tempo, with fades and crossfades that follow song changes,
//! toggles and global settings.
//!
//! ## Architecture
//!
//! - **setalight-core** - Audio graph, mixer, device output, envelopes, click timing
//! - [`PadPlaybackController`] - pad loading, fade in/out and crossfades
//! - [`MetronomeScheduler`] - deadline-scheduled clicks with bar accents
//! - [`PlaybackSession`] - active vs. current song, toggles, settings
//! - [`SessionDriver`] - runs a session on its own thread behind a [`SessionHandle`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use setalight_audio::prelude::*;
//!
//! let session = PlaybackSession::builder()
//!     .provider(CachedProvider::new(AssetPadProvider::new("assets/pads"), 12))
//!     .store(JsonVolumeStore::new("volume.json"))
//!     .build()?;
//!
//! let handle = SessionDriver::spawn(session)?;
//! handle.song_changed(SongDescriptor::new("D").bpm(72.0).time_signature(TimeSignature::default()))?;
//! handle.start()?;
//! # Ok::<(), setalight_audio::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `device` (default) - system audio output through CPAL

/// Re-export of setalight-core for direct access
pub use setalight_core as core;

pub use setalight_core::{
    compute_click_timing, Accent, AudioClock, AudioGraph, BackendKind, ClickTiming, Curve,
    Fraction, GraphClock, ManualClock, StereoMode, TimeSignature,
};

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::EngineConfig;

pub mod events;
pub use events::{ChannelKind, EngineEvent, Notifier, PlaybackState};

pub mod song;
pub use song::{GlobalSettings, SongDescriptor, ToggleState};

pub mod provider;
pub use provider::{AssetPadProvider, PadKey, PadSource, SampleProvider, StaticProvider};

mod cache;
pub use cache::{CacheStats, CachedProvider};

pub mod loader;
pub use loader::{LoadExecutor, LoadTicket};

pub mod prefs;
pub use prefs::{JsonVolumeStore, MemoryVolumeStore, VolumePrefs, VolumeStore};

mod stage;
pub use stage::Stage;

pub mod pads;
pub use pads::{PadNotice, PadPlaybackController, PadState, PadTimings};

pub mod metronome;
pub use metronome::{MetronomeScheduler, MetronomeState};

mod session;
pub use session::PlaybackSession;

mod builder;
pub use builder::SessionBuilder;

pub mod driver;
pub use driver::{SessionCommand, SessionDriver, SessionHandle};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        AssetPadProvider, BackendKind, CachedProvider, ChannelKind, EngineConfig, EngineEvent,
        GlobalSettings, JsonVolumeStore, PlaybackSession, PlaybackState, SessionDriver,
        SessionHandle, SongDescriptor, StaticProvider, TimeSignature, ToggleState,
    };
}
