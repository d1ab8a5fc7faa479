//! Playback notifications for whoever reflects engine state (usually a UI).

use crate::song::ToggleState;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Pads,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    FadingIn,
    FadingOut,
    Playing,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    Playback {
        channel: ChannelKind,
        state: PlaybackState,
    },
    /// No pad could be produced for `key`. The pads toggle has been cleared.
    PadLoadFailed { key: String, reason: String },
    /// Click requested for a song without usable tempo or meter.
    ClickRefused,
    /// The output stream would not start. Retry after the next user gesture.
    OutputBlocked(String),
    ToggleChanged(ToggleState),
}

/// Fans events out to every live subscriber.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Dropped receivers are pruned here.
    pub fn emit(&self, event: EngineEvent) {
        tracing::trace!(?event, "engine event");
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn playback(&self, channel: ChannelKind, state: PlaybackState) {
        self.emit(EngineEvent::Playback { channel, state });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
