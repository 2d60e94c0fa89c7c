//! # laprdus-tts
//!
//! Speech-service orchestration around the Laprdus phoneme synthesis engine
//! (Croatian and Serbian).
//!
//! The native engine turns text into 16-bit PCM and is treated as an opaque
//! collaborator behind [`SpeechEngine`]. This crate owns everything around
//! it that a system-wide speech service needs:
//!
//! - **Engine lifecycle**: one exclusively-locked engine driven through an
//!   explicit state machine, with single-flight (re)initialisation
//!   ([`lifecycle`]).
//! - **Settings precedence**: per-request speed/pitch versus the user's
//!   forced preferences ([`resolver`], [`settings`]).
//! - **Voices**: two physical voices and three pitch-shifted derived voices,
//!   plus language resolution ([`voices`]).
//! - **Dictionaries**: bundled pronunciation, spelling and emoji
//!   dictionaries, with user entries overlaid ([`dictionary`]).
//! - **Spelled mode**: single grapheme clusters are spelled out
//!   ([`grapheme`]).
//! - **Audio delivery**: chunked streaming to the host sink with
//!   cancellation ([`audio`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use laprdus_tts::{
//!     assets::DirectoryAssets, service::{ServiceConfig, SpeechService},
//!     settings::JsonSettingsStore, SynthesisRequest,
//! };
//!
//! let store = Arc::new(JsonSettingsStore::open(&data_dir.join("settings.json"))?);
//! let service = SpeechService::new(
//!     ServiceConfig::default(),
//!     Box::new(native_engine),
//!     Arc::new(DirectoryAssets::new("assets")),
//!     store,
//! )?;
//! service.start().await?;
//! service.synthesize(SynthesisRequest::new("Dobar dan!"), &mut sink).await?;
//! ```

pub mod assets;
pub mod audio;
pub mod dictionary;
pub mod grapheme;
pub mod lifecycle;
pub mod resolver;
pub mod service;
pub mod settings;
pub mod voices;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

use tokio_util::sync::CancellationToken;

pub use audio::{AudioFormat, AudioSink, SinkError};
pub use dictionary::{DictionaryCategory, DictionaryEntry};
pub use grapheme::SynthesisMode;
pub use lifecycle::{EngineManager, EngineState};
pub use resolver::SynthesisRequest;
pub use service::{ServiceConfig, ServiceError, SpeechService, SynthesisOutcome};
pub use settings::{NumberMode, PauseSettings, Settings};
pub use voices::{LanguageSupport, VoiceDescriptor, VoiceRegistry};

/// Output sample rate of the Laprdus engine.
pub const SAMPLE_RATE: u32 = 22050;

/// Errors reported by the native engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Engine not initialized. Load voice data first.")]
    NotInitialized,
    #[error("Invalid voice data: {0}")]
    InvalidVoiceData(String),
    #[error("Dictionary rejected: {0}")]
    DictionaryRejected(String),
    #[error("Synthesis cancelled")]
    Cancelled,
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
    #[error("Engine worker failed: {0}")]
    Worker(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The result of a synthesis operation.
///
/// Contains 16-bit mono PCM samples and the sample rate they were produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 16-bit PCM mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Interface to the native phoneme-to-audio engine.
///
/// Implementations are not expected to be thread-safe: the lifecycle manager
/// serialises every call behind one lock. Synthesis is CPU-bound and is run
/// on a blocking thread; it should poll `cancel` and return
/// [`EngineError::Cancelled`] promptly once it fires.
pub trait SpeechEngine: Send {
    /// (Re)initialise from a physical voice's waveform data.
    fn load_voice_data(&mut self, data: &[u8]) -> Result<(), EngineError>;

    /// Initialise from a voice data file on disk.
    fn load_voice_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let data = std::fs::read(path)?;
        self.load_voice_data(&data)
    }

    /// Release native resources. The engine reports not-ready afterwards.
    fn shutdown(&mut self);

    fn is_ready(&self) -> bool;

    /// Connected-speech synthesis.
    fn synthesize(&mut self, text: &str, cancel: &CancellationToken)
        -> Result<Vec<i16>, EngineError>;

    /// Character-by-character synthesis through the spelling dictionary.
    fn synthesize_spelled(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<i16>, EngineError>;

    /// Tempo multiplier, 0.5–2.0.
    fn set_speed(&mut self, speed: f32);

    /// User pitch preference, 0.5–2.0, applied on top of the voice pitch.
    fn set_pitch(&mut self, pitch: f32);

    /// Pitch multiplier of the active voice (1.0 for physical voices).
    fn set_base_pitch(&mut self, multiplier: f32);

    /// Output gain, 0.0–1.0.
    fn set_volume(&mut self, volume: f32);

    fn set_inflection_enabled(&mut self, enabled: bool);

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Abort any generation in progress and reset transient state.
    /// The engine stays initialised.
    fn cancel(&mut self);

    /// Replace one dictionary category with a JSON document.
    /// Returns the number of entries now held for that category.
    fn load_dictionary(
        &mut self,
        category: DictionaryCategory,
        json: &[u8],
    ) -> Result<usize, EngineError>;

    /// Append one pronunciation entry without clearing existing ones.
    fn add_pronunciation(&mut self, entry: &DictionaryEntry);

    fn set_emoji_enabled(&mut self, enabled: bool);

    fn set_pauses(&mut self, pauses: PauseSettings);

    fn pauses(&self) -> PauseSettings;

    fn set_number_mode(&mut self, mode: NumberMode);

    fn number_mode(&self) -> NumberMode;
}
