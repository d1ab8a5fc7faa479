//! Persisted pad and click volumes.

use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePrefs {
    pub pad_volume: f32,
    pub click_volume: f32,
}

impl VolumePrefs {
    pub fn new(pad_volume: f32, click_volume: f32) -> Self {
        Self {
            pad_volume: clamp_volume(pad_volume),
            click_volume: clamp_volume(click_volume),
        }
    }

    /// Values outside `[0, 1]` (or NaN) pulled back into range.
    pub fn clamped(self) -> Self {
        Self::new(self.pad_volume, self.click_volume)
    }
}

impl Default for VolumePrefs {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

pub(crate) fn clamp_volume(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub trait VolumeStore: Send {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<VolumePrefs>>;
    fn save(&self, prefs: &VolumePrefs) -> Result<()>;
}

/// Stores preferences as a small JSON document.
#[derive(Debug, Clone)]
pub struct JsonVolumeStore {
    path: PathBuf,
}

impl JsonVolumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl VolumeStore for JsonVolumeStore {
    fn load(&self) -> Result<Option<VolumePrefs>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let prefs: VolumePrefs = serde_json::from_str(&text)
            .map_err(|err| Error::Prefs(format!("{}: {err}", self.path.display())))?;
        Ok(Some(prefs.clamped()))
    }

    fn save(&self, prefs: &VolumePrefs) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryVolumeStore {
    prefs: Mutex<Option<VolumePrefs>>,
    saves: Mutex<usize>,
}

impl MemoryVolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefs(prefs: VolumePrefs) -> Self {
        Self {
            prefs: Mutex::new(Some(prefs)),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Option<VolumePrefs> {
        *self.prefs.lock()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl VolumeStore for MemoryVolumeStore {
    fn load(&self) -> Result<Option<VolumePrefs>> {
        Ok(*self.prefs.lock())
    }

    fn save(&self, prefs: &VolumePrefs) -> Result<()> {
        *self.prefs.lock() = Some(*prefs);
        *self.saves.lock() += 1;
        Ok(())
    }
}

impl<S: VolumeStore + Sync + ?Sized> VolumeStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<VolumePrefs>> {
        (**self).load()
    }

    fn save(&self, prefs: &VolumePrefs) -> Result<()> {
        (**self).save(prefs)
    }
}
