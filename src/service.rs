//! The host-facing speech service.
//!
//! [`SpeechService`] answers the operating system's text-to-speech contract:
//! lifecycle, language and voice queries, and the streaming synthesis call.
//! It ties the settings stream, the engine manager, the resolver, the
//! grapheme dispatcher and audio delivery together.

use std::path::PathBuf;
use std::sync::Arc;

use derive_builder::Builder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assets::AssetSource;
use crate::audio::{AudioDelivery, AudioSink, DeliveryOutcome, SinkError, DEFAULT_CHUNK_SIZE};
use crate::grapheme::{self, SynthesisMode};
use crate::lifecycle::{EngineManager, EngineState};
use crate::resolver::{self, SynthesisRequest, VoiceChoice};
use crate::settings::{Settings, SettingsCache, SettingsError, SettingsStore};
use crate::voices::{LanguageSupport, RegistryError, VoiceRegistry};
use crate::{EngineError, SpeechEngine, SynthesisResult};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Engine not ready: {0}")]
    EngineNotReady(#[source] EngineError),
    #[error("Unknown voice '{0}'")]
    UnknownVoice(String),
    #[error("Audio sink rejected playback: {0}")]
    SinkRejected(#[from] SinkError),
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(#[source] EngineError),
    #[error("Speech service has been shut down")]
    ShutDown,
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Invalid voice table: {0}")]
    Registry(#[from] RegistryError),
}

/// Static service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default)]
pub struct ServiceConfig {
    /// Directory holding the user dictionary files.
    #[builder(setter(into, strip_option))]
    pub user_dir: Option<PathBuf>,
    /// Bytes per sink write.
    pub chunk_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            user_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// How a synthesis call ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Every chunk was delivered and the sink got `done`.
    Completed { mode: SynthesisMode, samples: usize },
    /// Empty input; the sink got `done` without any audio.
    Empty,
    /// Stopped or superseded; the sink got neither `done` nor `error`.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoiceQuality {
    High,
    Normal,
}

/// A voice as advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostVoice {
    pub id: String,
    /// BCP-47 locale, e.g. `hr-HR`.
    pub locale: String,
    pub quality: VoiceQuality,
}

pub struct SpeechService {
    manager: Arc<EngineManager>,
    store: Arc<dyn SettingsStore>,
    settings: SettingsCache,
    delivery: AudioDelivery,
    current_call: Mutex<CancellationToken>,
    listener: Mutex<Option<JoinHandle<()>>>,
    listener_stop: CancellationToken,
}

impl SpeechService {
    /// Build a service around `engine` with the built-in voice table.
    pub fn new(
        config: ServiceConfig,
        engine: Box<dyn SpeechEngine>,
        assets: Arc<dyn AssetSource>,
        store: Arc<dyn SettingsStore>,
    ) -> Result<Self, ServiceError> {
        Self::with_registry(config, VoiceRegistry::builtin()?, engine, assets, store)
    }

    pub fn with_registry(
        config: ServiceConfig,
        registry: VoiceRegistry,
        engine: Box<dyn SpeechEngine>,
        assets: Arc<dyn AssetSource>,
        store: Arc<dyn SettingsStore>,
    ) -> Result<Self, ServiceError> {
        let settings = SettingsCache::default();
        let manager = EngineManager::new(
            engine,
            Arc::new(registry),
            assets,
            settings.clone(),
            config.user_dir.clone(),
        );
        Ok(Self {
            manager: Arc::new(manager),
            store,
            settings,
            delivery: AudioDelivery::new(config.chunk_size),
            current_call: Mutex::new(CancellationToken::new()),
            listener: Mutex::new(None),
            listener_stop: CancellationToken::new(),
        })
    }

    pub fn manager(&self) -> &EngineManager {
        &self.manager
    }

    pub fn state(&self) -> EngineState {
        self.manager.state()
    }

    /// The settings snapshot synthesis currently uses.
    pub fn settings(&self) -> Settings {
        self.settings.snapshot()
    }

    /// Prime the settings cache, start following the settings stream and
    /// initialise the engine with the stored default voice.
    ///
    /// An initialisation failure is returned but leaves the service usable:
    /// the next synthesis call retries.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut rx = self.store.subscribe();
        self.settings.store(rx.borrow_and_update().clone());

        let cache = self.settings.clone();
        let manager = Arc::clone(&self.manager);
        let stop = self.listener_stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            log::debug!("Settings stream closed");
                            break;
                        }
                        let snapshot = rx.borrow_and_update().clone();
                        log::debug!("Settings updated");
                        cache.store(snapshot.clone());
                        manager.apply_advanced(&snapshot).await;
                    }
                }
            }
        });
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }

        log::info!("Speech service started");
        self.manager.ensure_ready().await
    }

    /// Interrupt the in-flight synthesis call, if any.
    pub fn stop(&self) {
        log::debug!("Stop requested");
        self.current_call.lock().cancel();
    }

    /// Stop everything and release the engine for good.
    pub async fn destroy(&self) {
        self.stop();
        self.listener_stop.cancel();
        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                log::warn!("Settings listener ended abnormally: {e}");
            }
        }
        self.manager.shutdown().await;
        log::info!("Speech service destroyed");
    }

    pub fn is_language_available(&self, language: &str, country: Option<&str>) -> LanguageSupport {
        self.manager.registry().resolve_language(language, country)
    }

    /// Language and country codes of the active voice.
    pub fn language(&self) -> Option<(&'static str, &'static str)> {
        self.manager
            .active_voice()
            .map(|v| (v.language.code(), v.language.country()))
    }

    /// Make sure a voice of `language` is active.
    ///
    /// Keeps the active voice when it already speaks the language, otherwise
    /// switches to the family's default voice. Unsupported languages leave
    /// the engine untouched.
    pub async fn load_language(
        &self,
        language: &str,
        country: Option<&str>,
    ) -> Result<LanguageSupport, ServiceError> {
        let support = self.is_language_available(language, country);
        if support == LanguageSupport::Unsupported {
            return Ok(support);
        }

        let target = self.manager.registry().default_voice_for(language);
        let already = self
            .manager
            .active_voice()
            .is_some_and(|active| active.language == target.language);
        if !already {
            let id = target.id;
            self.manager.set_voice(id).await?;
        }
        Ok(support)
    }

    pub fn voices(&self) -> Vec<HostVoice> {
        self.manager
            .registry()
            .all()
            .iter()
            .map(|v| HostVoice {
                id: v.id.to_string(),
                locale: v.language.tag(),
                quality: if v.is_physical() {
                    VoiceQuality::High
                } else {
                    VoiceQuality::Normal
                },
            })
            .collect()
    }

    pub fn is_valid_voice_name(&self, name: &str) -> bool {
        self.manager.registry().find(name).is_some()
    }

    pub async fn load_voice(&self, name: &str) -> Result<(), ServiceError> {
        self.manager.set_voice(name).await
    }

    pub fn default_voice_name_for(&self, language: &str) -> &'static str {
        self.manager.registry().default_voice_for(language).id
    }

    /// Install a fresh cancellation token, cancelling the previous call's.
    fn begin_call(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.current_call.lock(), token.clone());
        previous.cancel();
        token
    }

    /// Synthesize `request` and stream it to `sink`.
    ///
    /// A new call supersedes any call still in flight. Failures before any
    /// audio is produced send `error` to the sink and no audio; a cancelled
    /// call sends nothing further.
    pub async fn synthesize(
        &self,
        request: SynthesisRequest,
        sink: &mut dyn AudioSink,
    ) -> Result<SynthesisOutcome, ServiceError> {
        let token = self.begin_call();

        let Some(mode) = grapheme::dispatch(&request.text) else {
            log::debug!("Empty input, nothing to synthesize");
            sink.done().await;
            return Ok(SynthesisOutcome::Empty);
        };

        if let Err(e) = self.prepare(&request).await {
            sink.error().await;
            return Err(e);
        }

        let mut engine = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(SynthesisOutcome::Cancelled),
            guard = self.manager.lock_ready() => match guard {
                Ok(guard) => guard,
                Err(e) => {
                    sink.error().await;
                    return Err(e);
                }
            },
        };

        let params = resolver::resolve(&request, &self.settings.snapshot());
        params.apply(&mut **engine);
        log::debug!(
            "Synthesizing {} chars in {mode:?} mode (speed {}, pitch {})",
            request.text.chars().count(),
            params.speed,
            params.pitch
        );

        let text = request.text;
        let engine_token = token.clone();
        let work = tokio::task::spawn_blocking(move || {
            let sample_rate = engine.sample_rate();
            let result = match mode {
                SynthesisMode::Normal => engine.synthesize(&text, &engine_token),
                SynthesisMode::Spelled => engine.synthesize_spelled(&text, &engine_token),
            };
            if engine_token.is_cancelled() {
                engine.cancel();
            }
            result.map(|samples| SynthesisResult {
                samples,
                sample_rate,
            })
        });

        let audio = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::debug!("Synthesis cancelled during generation");
                return Ok(SynthesisOutcome::Cancelled);
            }
            joined = work => match joined {
                Ok(Ok(audio)) => audio,
                Ok(Err(EngineError::Cancelled)) => return Ok(SynthesisOutcome::Cancelled),
                Ok(Err(e)) => {
                    log::error!("Synthesis failed: {e}");
                    sink.error().await;
                    return Err(ServiceError::SynthesisFailed(e));
                }
                Err(e) => {
                    log::error!("Synthesis worker failed: {e}");
                    sink.error().await;
                    return Err(ServiceError::SynthesisFailed(EngineError::Worker(e.to_string())));
                }
            },
        };

        if audio.is_empty() {
            log::error!("Engine produced no samples for non-empty text");
            sink.error().await;
            return Err(ServiceError::SynthesisFailed(EngineError::Synthesis(
                "no samples".into(),
            )));
        }

        match self.delivery.deliver(&audio, sink, &token).await? {
            DeliveryOutcome::Completed { bytes, chunks } => {
                log::debug!("Delivered {bytes} bytes in {chunks} chunks");
                Ok(SynthesisOutcome::Completed {
                    mode,
                    samples: audio.samples.len(),
                })
            }
            DeliveryOutcome::Cancelled { bytes_written } => {
                log::debug!("Delivery cancelled after {bytes_written} bytes");
                Ok(SynthesisOutcome::Cancelled)
            }
        }
    }

    /// Bring the engine up and onto the voice this call should use.
    async fn prepare(&self, request: &SynthesisRequest) -> Result<(), ServiceError> {
        self.manager.ensure_ready().await?;

        match resolver::resolve_voice(&self.settings.snapshot()) {
            VoiceChoice::KeepActive => {
                if let Some(tag) = &request.language {
                    log::debug!("Language hint {tag} left to the active voice");
                }
                Ok(())
            }
            VoiceChoice::Forced(id) => {
                let active = self.manager.active_voice().map(|v| v.id);
                if active == Some(id.as_str()) {
                    return Ok(());
                }
                match self.manager.set_voice(&id).await {
                    Err(ServiceError::UnknownVoice(_)) => {
                        log::warn!("Forced voice '{id}' is unknown, keeping the active voice");
                        Ok(())
                    }
                    other => other,
                }
            }
        }
    }
}
