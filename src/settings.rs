//! User preferences, the settings store and the cached snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use derive_builder::Builder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);
pub const PITCH_RANGE: (f32, f32) = (0.5, 2.0);
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
pub const MAX_PAUSE_MS: u32 = 2000;

pub const DEFAULT_VOICE: &str = "josip";

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// How digit runs are read aloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberMode {
    /// "123" is read as one hundred twenty-three.
    #[default]
    Whole,
    /// "123" is read as one, two, three.
    DigitByDigit,
}

/// Pause durations in milliseconds, each within `0..=2000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseSettings {
    pub sentence_ms: u32,
    pub comma_ms: u32,
    pub newline_ms: u32,
}

impl Default for PauseSettings {
    fn default() -> Self {
        Self {
            sentence_ms: 100,
            comma_ms: 100,
            newline_ms: 100,
        }
    }
}

impl PauseSettings {
    pub fn clamped(self) -> Self {
        Self {
            sentence_ms: self.sentence_ms.min(MAX_PAUSE_MS),
            comma_ms: self.comma_ms.min(MAX_PAUSE_MS),
            newline_ms: self.newline_ms.min(MAX_PAUSE_MS),
        }
    }
}

/// Snapshot of every persisted user preference.
///
/// `Default` yields the values used before the store has emitted anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct Settings {
    #[builder(setter(into))]
    pub default_voice: String,
    pub speed: f32,
    pub pitch: f32,
    pub volume: f32,
    pub force_speed: bool,
    pub force_pitch: bool,
    pub force_volume: bool,
    pub force_language: bool,
    pub emoji_enabled: bool,
    pub inflection_enabled: bool,
    pub user_dictionaries_enabled: bool,
    pub pauses: PauseSettings,
    pub number_mode: NumberMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_voice: DEFAULT_VOICE.to_string(),
            speed: 1.0,
            pitch: 1.0,
            volume: 1.0,
            force_speed: false,
            force_pitch: false,
            force_volume: false,
            force_language: false,
            emoji_enabled: false,
            inflection_enabled: true,
            user_dictionaries_enabled: true,
            pauses: PauseSettings::default(),
            number_mode: NumberMode::Whole,
        }
    }
}

/// A single-field write to the settings store.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    DefaultVoice(String),
    Speed(f32),
    Pitch(f32),
    Volume(f32),
    ForceSpeed(bool),
    ForcePitch(bool),
    ForceVolume(bool),
    ForceLanguage(bool),
    EmojiEnabled(bool),
    InflectionEnabled(bool),
    UserDictionariesEnabled(bool),
    SentencePause(u32),
    CommaPause(u32),
    NewlinePause(u32),
    NumberMode(NumberMode),
    RestoreDefaultSpeed,
    RestoreDefaultPitch,
    RestoreDefaultVolume,
}

impl Settings {
    /// Apply one change, clamping numeric values into their ranges.
    pub fn apply(&mut self, change: SettingChange) {
        let defaults = Settings::default();
        match change {
            SettingChange::DefaultVoice(id) => self.default_voice = id,
            SettingChange::Speed(v) => self.speed = clamp_to(v, SPEED_RANGE),
            SettingChange::Pitch(v) => self.pitch = clamp_to(v, PITCH_RANGE),
            SettingChange::Volume(v) => self.volume = clamp_to(v, VOLUME_RANGE),
            SettingChange::ForceSpeed(on) => self.force_speed = on,
            SettingChange::ForcePitch(on) => self.force_pitch = on,
            SettingChange::ForceVolume(on) => self.force_volume = on,
            SettingChange::ForceLanguage(on) => self.force_language = on,
            SettingChange::EmojiEnabled(on) => self.emoji_enabled = on,
            SettingChange::InflectionEnabled(on) => self.inflection_enabled = on,
            SettingChange::UserDictionariesEnabled(on) => self.user_dictionaries_enabled = on,
            SettingChange::SentencePause(ms) => self.pauses.sentence_ms = ms.min(MAX_PAUSE_MS),
            SettingChange::CommaPause(ms) => self.pauses.comma_ms = ms.min(MAX_PAUSE_MS),
            SettingChange::NewlinePause(ms) => self.pauses.newline_ms = ms.min(MAX_PAUSE_MS),
            SettingChange::NumberMode(mode) => self.number_mode = mode,
            SettingChange::RestoreDefaultSpeed => self.speed = defaults.speed,
            SettingChange::RestoreDefaultPitch => self.pitch = defaults.pitch,
            SettingChange::RestoreDefaultVolume => self.volume = defaults.volume,
        }
    }

    /// Bring every field of a hand-edited or older file into range.
    fn sanitized(mut self) -> Self {
        self.speed = clamp_to(self.speed, SPEED_RANGE);
        self.pitch = clamp_to(self.pitch, PITCH_RANGE);
        self.volume = clamp_to(self.volume, VOLUME_RANGE);
        self.pauses = self.pauses.clamped();
        self
    }
}

/// Clamp `value` into `(lo, hi)`. NaN collapses to the lower bound.
pub fn clamp_to(value: f32, (lo, hi): (f32, f32)) -> f32 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

/// Source of settings snapshots.
///
/// `subscribe` is the read stream; `apply` persists one field and then
/// publishes the new snapshot on every subscribed stream.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Settings>;

    async fn apply(&self, change: SettingChange) -> Result<(), SettingsError>;
}

/// Settings store persisted as a JSON document.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Settings>,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    /// A store that never touches disk.
    pub fn in_memory(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial.sanitized());
        Self {
            path: None,
            tx,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store backed by `path`. A missing file starts from defaults.
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let initial = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Settings>(&content)?.sanitized()
        } else {
            log::info!("No settings file at {}, using defaults", path.display());
            Settings::default()
        };

        let (tx, _) = watch::channel(initial);
        Ok(Self {
            path: Some(path.to_path_buf()),
            tx,
            write_lock: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }
}

#[async_trait::async_trait]
impl SettingsStore for JsonSettingsStore {
    fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    async fn apply(&self, change: SettingChange) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.current();
        log::debug!("Applying setting change {change:?}");
        next.apply(change);

        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&next)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, json).await?;
        }

        self.tx.send_replace(next);
        Ok(())
    }
}

/// Last snapshot seen on the settings stream.
///
/// Readers never wait on the store: before the first snapshot arrives
/// they get `Settings::default()`.
#[derive(Debug, Clone, Default)]
pub struct SettingsCache {
    inner: Arc<RwLock<Option<Settings>>>,
}

impl SettingsCache {
    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone().unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn store(&self, settings: Settings) {
        *self.inner.write() = Some(settings);
    }
}
