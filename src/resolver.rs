//! Per-request precedence between host hints and forced user preferences.
//!
//! Each attribute is resolved on its own: a force flag only ever affects the
//! attribute it names.

use crate::settings::{clamp_to, Settings, PITCH_RANGE, SPEED_RANGE, VOLUME_RANGE};
use crate::SpeechEngine;

/// One synthesis call as issued by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Speed multiplier requested by the caller (1.0 = normal).
    pub speed: Option<f32>,
    /// Pitch multiplier requested by the caller (1.0 = normal).
    pub pitch: Option<f32>,
    /// Language tag requested by the caller, e.g. `hr-HR`.
    pub language: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Build from host rates expressed in percent, where 100 is normal.
    pub fn from_host_rates(text: impl Into<String>, speech_rate: u32, pitch: u32) -> Self {
        Self::new(text)
            .with_speed(speech_rate as f32 / 100.0)
            .with_pitch(pitch as f32 / 100.0)
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_language(mut self, tag: impl Into<String>) -> Self {
        self.language = Some(tag.into());
        self
    }
}

/// Which voice a call should use.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceChoice {
    /// Whatever voice is loaded stays.
    KeepActive,
    /// The user's stored default voice, regardless of the host.
    Forced(String),
}

/// Effective parameters for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub speed: f32,
    pub pitch: f32,
    /// `None` leaves volume to the host's own output control.
    pub volume: Option<f32>,
    pub voice: VoiceChoice,
}

impl ResolvedParams {
    /// Push speed, pitch and (only when forced) volume into the engine.
    pub fn apply(&self, engine: &mut dyn SpeechEngine) {
        engine.set_speed(self.speed);
        engine.set_pitch(self.pitch);
        if let Some(volume) = self.volume {
            engine.set_volume(volume);
        }
    }
}

pub fn resolve(request: &SynthesisRequest, settings: &Settings) -> ResolvedParams {
    ResolvedParams {
        speed: resolve_speed(request.speed, settings),
        pitch: resolve_pitch(request.pitch, settings),
        volume: resolve_volume(settings),
        voice: resolve_voice(settings),
    }
}

pub fn resolve_speed(requested: Option<f32>, settings: &Settings) -> f32 {
    if settings.force_speed {
        log::debug!("Using forced speed {}", settings.speed);
        clamp_to(settings.speed, SPEED_RANGE)
    } else {
        clamp_to(requested.unwrap_or(1.0), SPEED_RANGE)
    }
}

pub fn resolve_pitch(requested: Option<f32>, settings: &Settings) -> f32 {
    if settings.force_pitch {
        log::debug!("Using forced pitch {}", settings.pitch);
        clamp_to(settings.pitch, PITCH_RANGE)
    } else {
        clamp_to(requested.unwrap_or(1.0), PITCH_RANGE)
    }
}

pub fn resolve_volume(settings: &Settings) -> Option<f32> {
    settings
        .force_volume
        .then(|| clamp_to(settings.volume, VOLUME_RANGE))
}

pub fn resolve_voice(settings: &Settings) -> VoiceChoice {
    if settings.force_language {
        VoiceChoice::Forced(settings.default_voice.clone())
    } else {
        VoiceChoice::KeepActive
    }
}
