//! Runs a [`PlaybackSession`] on its own thread.
//!
//! Callers talk to the session through a cloneable [`SessionHandle`]. The
//! thread applies each command as it arrives, then ticks the session and
//! sleeps until the session's next deadline (never longer than
//! `driver_idle_ms`, so outstanding loads are still picked up).

use crate::events::{EngineEvent, Notifier};
use crate::session::PlaybackSession;
use crate::song::{GlobalSettings, SongDescriptor};
use crate::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Inspect = Box<dyn FnOnce(&PlaybackSession) + Send>;

pub enum SessionCommand {
    SongChanged(SongDescriptor),
    Start(Option<Sender<Result<()>>>),
    Stop,
    TogglePads,
    ToggleClick,
    Settings(GlobalSettings),
    PadVolume(f32),
    ClickVolume(f32),
    Inspect(Inspect),
    Shutdown,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SongChanged(song) => f.debug_tuple("SongChanged").field(&song.key).finish(),
            Self::Start(_) => f.write_str("Start"),
            Self::Stop => f.write_str("Stop"),
            Self::TogglePads => f.write_str("TogglePads"),
            Self::ToggleClick => f.write_str("ToggleClick"),
            Self::Settings(settings) => f.debug_tuple("Settings").field(settings).finish(),
            Self::PadVolume(v) => f.debug_tuple("PadVolume").field(v).finish(),
            Self::ClickVolume(v) => f.debug_tuple("ClickVolume").field(v).finish(),
            Self::Inspect(_) => f.write_str("Inspect"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

pub struct SessionDriver;

impl SessionDriver {
    /// Move `session` onto a new thread.
    pub fn spawn(session: PlaybackSession) -> Result<SessionHandle> {
        let (tx, rx) = unbounded();
        let notifier = session.notifier();
        let idle = Duration::from_millis(session.config().driver_idle_ms.max(1));

        let thread = thread::Builder::new()
            .name("setalight-session".into())
            .spawn(move || run(session, rx, idle))?;

        tracing::debug!("session driver started");
        Ok(SessionHandle {
            inner: Arc::new(HandleInner {
                tx,
                notifier,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }
}

fn run(mut session: PlaybackSession, rx: Receiver<SessionCommand>, idle: Duration) {
    'driver: loop {
        let wait = session
            .next_deadline()
            .map(|deadline| {
                let ms = (deadline - session.now_ms()).max(0.0);
                Duration::from_secs_f64(ms / 1000.0).min(idle)
            })
            .unwrap_or(idle);

        match rx.recv_timeout(wait) {
            Ok(command) => {
                if !apply(&mut session, command) {
                    break 'driver;
                }
                // Take everything already queued before ticking.
                while let Ok(command) = rx.try_recv() {
                    if !apply(&mut session, command) {
                        break 'driver;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        session.tick();
    }

    session.dispose();
    tracing::debug!("session driver stopped");
}

/// Returns `false` on shutdown.
fn apply(session: &mut PlaybackSession, command: SessionCommand) -> bool {
    match command {
        SessionCommand::SongChanged(song) => session.on_song_changed(song),
        SessionCommand::Start(reply) => {
            let result = session.on_start_requested();
            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "start failed");
                    }
                }
            }
        }
        SessionCommand::Stop => session.on_stop_requested(),
        SessionCommand::TogglePads => session.on_pads_toggle(),
        SessionCommand::ToggleClick => session.on_click_toggle(),
        SessionCommand::Settings(settings) => session.on_settings_changed(settings),
        SessionCommand::PadVolume(v) => session.set_pad_volume(v),
        SessionCommand::ClickVolume(v) => session.set_click_volume(v),
        SessionCommand::Inspect(f) => f(session),
        SessionCommand::Shutdown => return false,
    }
    true
}

struct HandleInner {
    tx: Sender<SessionCommand>,
    notifier: Arc<Notifier>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl HandleInner {
    fn stop(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                tracing::warn!("session driver thread panicked");
            }
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable remote control for a driven session.
///
/// Dropping the last clone shuts the driver down.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.inner
            .tx
            .send(command)
            .map_err(|_| Error::DriverStopped)
    }

    pub fn song_changed(&self, song: SongDescriptor) -> Result<()> {
        self.send(SessionCommand::SongChanged(song))
    }

    /// Request a start and wait for its outcome.
    pub fn start(&self) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(SessionCommand::Start(Some(reply_tx)))?;
        reply_rx.recv().map_err(|_| Error::DriverStopped)?
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop)
    }

    pub fn toggle_pads(&self) -> Result<()> {
        self.send(SessionCommand::TogglePads)
    }

    pub fn toggle_click(&self) -> Result<()> {
        self.send(SessionCommand::ToggleClick)
    }

    pub fn settings_changed(&self, settings: GlobalSettings) -> Result<()> {
        self.send(SessionCommand::Settings(settings))
    }

    pub fn set_pad_volume(&self, volume: f32) -> Result<()> {
        self.send(SessionCommand::PadVolume(volume))
    }

    pub fn set_click_volume(&self, volume: f32) -> Result<()> {
        self.send(SessionCommand::ClickVolume(volume))
    }

    /// Run `f` against the session on the driver thread and return its result.
    pub fn inspect<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&PlaybackSession) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(SessionCommand::Inspect(Box::new(move |session| {
            let _ = reply_tx.send(f(session));
        })))?;
        reply_rx.recv().map_err(|_| Error::DriverStopped)
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.inner.notifier.subscribe()
    }

    /// Stop the driver and wait for it. The session is disposed.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .thread
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
