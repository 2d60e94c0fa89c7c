//! Engine ownership and the lifecycle state machine.
//!
//! The native engine is a single exclusively-owned handle. Every call into it
//! goes through one `tokio::sync::Mutex`; (re)initialisation is additionally
//! serialised by an in-flight guard so concurrent callers converge on one
//! load sequence.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use crate::assets::AssetSource;
use crate::dictionary::{load_overlay, DictionaryCategory};
use crate::service::ServiceError;
use crate::settings::{Settings, SettingsCache};
use crate::voices::{VoiceDescriptor, VoiceRegistry};
use crate::{EngineError, SpeechEngine};

/// Exclusive access to the engine, held across a blocking call.
pub type EngineGuard = OwnedMutexGuard<Box<dyn SpeechEngine>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
    /// Terminal.
    ShutDown,
}

impl EngineState {
    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Uninitialized | Ready | Error, Initializing)
                | (Initializing, Ready | Error)
                | (Ready, Error)
                | (Uninitialized | Initializing | Ready | Error, ShutDown)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::ShutDown => "shut down",
        };
        f.write_str(name)
    }
}

/// Sole owner and writer of the engine.
pub struct EngineManager {
    engine: Arc<Mutex<Box<dyn SpeechEngine>>>,
    registry: Arc<VoiceRegistry>,
    assets: Arc<dyn AssetSource>,
    settings: SettingsCache,
    user_dir: Option<PathBuf>,
    state: watch::Sender<EngineState>,
    init_lock: Mutex<()>,
    active_voice: RwLock<Option<VoiceDescriptor>>,
    failed_dictionaries: RwLock<Vec<DictionaryCategory>>,
}

impl EngineManager {
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        registry: Arc<VoiceRegistry>,
        assets: Arc<dyn AssetSource>,
        settings: SettingsCache,
        user_dir: Option<PathBuf>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            registry,
            assets,
            settings,
            user_dir,
            state,
            init_lock: Mutex::new(()),
            active_voice: RwLock::new(None),
            failed_dictionaries: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    /// The voice currently loaded into the engine, if any.
    pub fn active_voice(&self) -> Option<VoiceDescriptor> {
        self.active_voice.read().clone()
    }

    /// Categories whose bundled dictionary failed during the last load.
    pub fn failed_dictionaries(&self) -> Vec<DictionaryCategory> {
        self.failed_dictionaries.read().clone()
    }

    fn transition(&self, next: EngineState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            if !state.can_transition_to(next) {
                log::warn!("Ignoring engine transition {state} -> {next}");
                return false;
            }
            log::debug!("Engine {state} -> {next}");
            *state = next;
            true
        });
    }

    /// Make sure the engine is initialised.
    ///
    /// Returns at once when ready. Otherwise loads the active voice (or the
    /// stored default voice on first use) and the dictionaries. Concurrent
    /// callers wait on the same attempt and never trigger a second load.
    pub async fn ensure_ready(&self) -> Result<(), ServiceError> {
        if self.state() == EngineState::Ready {
            return Ok(());
        }

        let _init = self.init_lock.lock().await;
        match self.state() {
            EngineState::Ready => return Ok(()),
            EngineState::ShutDown => return Err(ServiceError::ShutDown),
            _ => {}
        }

        let voice = self.voice_to_restore();
        log::info!("Initializing engine with voice {voice}");
        self.load_voice(voice).await
    }

    fn voice_to_restore(&self) -> VoiceDescriptor {
        if let Some(active) = self.active_voice() {
            return active;
        }
        if !self.settings.is_loaded() {
            log::debug!("No settings snapshot yet, starting from defaults");
        }
        let wanted = self.settings.snapshot().default_voice;
        match self.registry.find(&wanted) {
            Some(voice) => voice.clone(),
            None => {
                let fallback = self.registry.fallback();
                log::warn!("Stored voice '{wanted}' is unknown, using {}", fallback.id);
                fallback.clone()
            }
        }
    }

    /// Switch to `id`, reloading voice data and every dictionary.
    pub async fn set_voice(&self, id: &str) -> Result<(), ServiceError> {
        let voice = self
            .registry
            .find(id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownVoice(id.to_string()))?;

        let _init = self.init_lock.lock().await;
        if self.state() == EngineState::ShutDown {
            return Err(ServiceError::ShutDown);
        }
        log::info!("Switching voice to {voice}");
        self.load_voice(voice).await
    }

    /// Caller must hold `init_lock`.
    async fn load_voice(&self, voice: VoiceDescriptor) -> Result<(), ServiceError> {
        self.transition(EngineState::Initializing);

        let Some(data_file) = self.registry.data_file_for(&voice) else {
            self.transition(EngineState::Error);
            return Err(ServiceError::EngineNotReady(EngineError::InvalidVoiceData(
                format!("no data file for voice {}", voice.id),
            )));
        };
        let multiplier = voice.pitch_multiplier;
        let cache = self.settings.clone();
        let assets = Arc::clone(&self.assets);
        let user_file = self
            .user_dir
            .as_ref()
            .map(|dir| dir.join(DictionaryCategory::Pronunciation.user_file()));
        let mut engine = Arc::clone(&self.engine).lock_owned().await;

        let result = tokio::task::spawn_blocking(move || {
            // Snapshot under the engine lock; later updates queue behind it.
            let settings = cache.snapshot();
            let data = assets.read(data_file)?;
            engine.load_voice_data(&data)?;
            engine.set_base_pitch(multiplier);
            push_advanced(&mut **engine, &settings);
            Ok::<_, EngineError>(load_overlay(
                &mut **engine,
                assets.as_ref(),
                user_file.as_deref(),
                settings.user_dictionaries_enabled,
            ))
        })
        .await
        .map_err(|e| EngineError::Worker(e.to_string()))
        .and_then(|r| r);

        match result {
            Ok(report) => {
                if !report.is_complete() {
                    log::warn!(
                        "Voice {} ready with {} failed dictionaries",
                        voice.id,
                        report.failed.len()
                    );
                }
                *self.failed_dictionaries.write() =
                    report.failed.iter().map(|(category, _)| *category).collect();
                log::info!("Engine ready with voice {voice} (pitch x{multiplier})");
                *self.active_voice.write() = Some(voice);
                self.transition(EngineState::Ready);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load voice {}: {e}", voice.id);
                self.transition(EngineState::Error);
                Err(ServiceError::EngineNotReady(e))
            }
        }
    }

    /// Exclusive engine access for a synthesis call.
    ///
    /// If the native engine turns out to have lost its state since the last
    /// transition, it is reinitialised before the guard is handed out.
    pub async fn lock_ready(&self) -> Result<EngineGuard, ServiceError> {
        self.ensure_ready().await?;
        let guard = Arc::clone(&self.engine).lock_owned().await;
        if guard.is_ready() {
            return Ok(guard);
        }
        drop(guard);

        log::warn!("Engine lost its native state, reinitializing");
        self.transition(EngineState::Error);
        self.ensure_ready().await?;
        Ok(Arc::clone(&self.engine).lock_owned().await)
    }

    /// Push emoji, inflection, pause and number-mode settings into the
    /// engine.
    ///
    /// During a load this waits on the engine lock and lands after it. An
    /// engine that is not loaded at all picks the settings up on its next
    /// load instead.
    pub async fn apply_advanced(&self, settings: &Settings) {
        let state = self.state();
        if !matches!(state, EngineState::Initializing | EngineState::Ready) {
            log::debug!("Engine {state}, deferring advanced settings");
            return;
        }
        let mut engine = self.engine.lock().await;
        if self.state() == EngineState::ShutDown {
            return;
        }
        push_advanced(&mut **engine, settings);
    }

    /// Release the engine. Later calls fail with [`ServiceError::ShutDown`];
    /// shutting down twice is a no-op.
    pub async fn shutdown(&self) {
        let _init = self.init_lock.lock().await;
        if self.state() == EngineState::ShutDown {
            return;
        }
        self.transition(EngineState::ShutDown);
        self.engine.lock().await.shutdown();
        *self.active_voice.write() = None;
        log::info!("Engine shut down");
    }
}

fn push_advanced(engine: &mut dyn SpeechEngine, settings: &Settings) {
    engine.set_emoji_enabled(settings.emoji_enabled);
    engine.set_inflection_enabled(settings.inflection_enabled);
    engine.set_pauses(settings.pauses.clamped());
    engine.set_number_mode(settings.number_mode);
}
