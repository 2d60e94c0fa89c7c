//! Voice table and language resolution.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// Languages the engine can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    Croatian,
    Serbian,
}

impl Language {
    /// Map an ISO 639-1 or 639-2 language code to a supported family.
    ///
    /// Matching is case-insensitive; anything else is `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "hr" | "hrv" => Some(Self::Croatian),
            "sr" | "srp" => Some(Self::Serbian),
            _ => None,
        }
    }

    /// Two-letter language code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Croatian => "hr",
            Self::Serbian => "sr",
        }
    }

    /// Two-letter region code of the country the family is anchored in.
    pub fn country(self) -> &'static str {
        match self {
            Self::Croatian => "HR",
            Self::Serbian => "RS",
        }
    }

    /// BCP-47 tag, e.g. `hr-HR`.
    pub fn tag(self) -> String {
        format!("{}-{}", self.code(), self.country())
    }

    fn matches_country(self, country: &str) -> bool {
        let country = country.trim().to_ascii_lowercase();
        match self {
            Self::Croatian => country == "hr" || country == "hrv",
            Self::Serbian => country == "rs" || country == "srb",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgeClass {
    Child,
    Adult,
    Senior,
}

/// How well a requested language is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSupport {
    /// Language and region both match.
    FullMatch,
    /// Only the language matches; region missing or different.
    LanguageOnly,
    Unsupported,
}

/// A static voice definition.
///
/// Physical voices carry their own waveform data file and a pitch multiplier
/// of exactly 1.0. Derived voices name a physical `base_voice` and are
/// produced by pitch-shifting it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub language: Language,
    pub gender: Gender,
    pub age: AgeClass,
    pub base_voice: Option<&'static str>,
    pub pitch_multiplier: f32,
    pub data_file: Option<&'static str>,
}

impl VoiceDescriptor {
    pub fn is_physical(&self) -> bool {
        self.base_voice.is_none()
    }
}

const BUILTIN_VOICES: &[VoiceDescriptor] = &[
    VoiceDescriptor {
        id: "josip",
        display_name: "Laprdus Josip (Croatian)",
        language: Language::Croatian,
        gender: Gender::Male,
        age: AgeClass::Adult,
        base_voice: None,
        pitch_multiplier: 1.0,
        data_file: Some("Josip.bin"),
    },
    VoiceDescriptor {
        id: "vlado",
        display_name: "Laprdus Vlado (Serbian)",
        language: Language::Serbian,
        gender: Gender::Male,
        age: AgeClass::Adult,
        base_voice: None,
        pitch_multiplier: 1.0,
        data_file: Some("Vlado.bin"),
    },
    VoiceDescriptor {
        id: "detence",
        display_name: "Laprdus Detence (Croatian)",
        language: Language::Croatian,
        gender: Gender::Male,
        age: AgeClass::Child,
        base_voice: Some("josip"),
        pitch_multiplier: 1.5,
        data_file: None,
    },
    VoiceDescriptor {
        id: "baba",
        display_name: "Laprdus Baba (Croatian)",
        language: Language::Croatian,
        gender: Gender::Female,
        age: AgeClass::Senior,
        base_voice: Some("josip"),
        pitch_multiplier: 1.2,
        data_file: None,
    },
    VoiceDescriptor {
        id: "djedo",
        display_name: "Laprdus Djedo (Serbian)",
        language: Language::Serbian,
        gender: Gender::Male,
        age: AgeClass::Senior,
        base_voice: Some("vlado"),
        pitch_multiplier: 0.75,
        data_file: None,
    },
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Voice registry is empty")]
    Empty,
    #[error("Voice '{0}' is defined more than once")]
    Duplicate(String),
    #[error("Derived voice '{voice}' names unknown base voice '{base}'")]
    MissingBase { voice: String, base: String },
    #[error("Derived voice '{voice}' is based on '{base}', which is not a physical voice")]
    BaseNotPhysical { voice: String, base: String },
    #[error("Voice '{0}' has a pitch multiplier inconsistent with its kind")]
    PitchMismatch(String),
    #[error("Physical voice '{0}' has no data file")]
    MissingDataFile(String),
}

/// Validated table of voices. The first entry is the global fallback.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: Vec<VoiceDescriptor>,
}

impl VoiceRegistry {
    /// The five voices shipped with the engine.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(BUILTIN_VOICES.to_vec())
    }

    /// Build a registry, rejecting any table that breaks the
    /// physical/derived invariants.
    pub fn new(voices: Vec<VoiceDescriptor>) -> Result<Self, RegistryError> {
        if voices.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for voice in &voices {
            if !seen.insert(voice.id) {
                return Err(RegistryError::Duplicate(voice.id.to_string()));
            }
        }

        for voice in &voices {
            match voice.base_voice {
                None => {
                    if voice.pitch_multiplier != 1.0 {
                        return Err(RegistryError::PitchMismatch(voice.id.to_string()));
                    }
                    if voice.data_file.is_none() {
                        return Err(RegistryError::MissingDataFile(voice.id.to_string()));
                    }
                }
                Some(base) => {
                    if voice.pitch_multiplier == 1.0 || voice.pitch_multiplier <= 0.0 {
                        return Err(RegistryError::PitchMismatch(voice.id.to_string()));
                    }
                    let base_voice = voices.iter().find(|v| v.id == base).ok_or_else(|| {
                        RegistryError::MissingBase {
                            voice: voice.id.to_string(),
                            base: base.to_string(),
                        }
                    })?;
                    if !base_voice.is_physical() {
                        return Err(RegistryError::BaseNotPhysical {
                            voice: voice.id.to_string(),
                            base: base.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { voices })
    }

    pub fn all(&self) -> &[VoiceDescriptor] {
        &self.voices
    }

    pub fn find(&self, id: &str) -> Option<&VoiceDescriptor> {
        self.voices.iter().find(|v| v.id == id)
    }

    /// The global fallback voice.
    pub fn fallback(&self) -> &VoiceDescriptor {
        &self.voices[0]
    }

    /// The physical voice whose waveform data backs `voice`.
    pub fn physical_for<'a>(&'a self, voice: &'a VoiceDescriptor) -> &'a VoiceDescriptor {
        match voice.base_voice {
            None => voice,
            // Validated at construction.
            Some(base) => self.find(base).unwrap_or(voice),
        }
    }

    /// Name of the data file to load for `voice`.
    pub fn data_file_for(&self, voice: &VoiceDescriptor) -> Option<&'static str> {
        self.physical_for(voice).data_file
    }

    /// Classify a language code plus optional region.
    pub fn resolve_language(&self, language: &str, country: Option<&str>) -> LanguageSupport {
        let Some(lang) = Language::from_code(language) else {
            return LanguageSupport::Unsupported;
        };
        if !self.voices.iter().any(|v| v.language == lang) {
            return LanguageSupport::Unsupported;
        }
        match country {
            Some(c) if lang.matches_country(c) => LanguageSupport::FullMatch,
            _ => LanguageSupport::LanguageOnly,
        }
    }

    /// Classify a BCP-47-ish tag such as `hr`, `hr-HR` or `srp_RS`.
    pub fn resolve_tag(&self, tag: &str) -> LanguageSupport {
        let (language, country) = split_tag(tag);
        self.resolve_language(language, country)
    }

    /// Primary physical voice for a language code, or the global fallback.
    pub fn default_voice_for(&self, language: &str) -> &VoiceDescriptor {
        Language::from_code(language)
            .and_then(|lang| {
                self.voices
                    .iter()
                    .find(|v| v.language == lang && v.is_physical())
            })
            .unwrap_or_else(|| self.fallback())
    }
}

impl fmt::Display for VoiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.language.tag())
    }
}

fn split_tag(tag: &str) -> (&str, Option<&str>) {
    let mut parts = tag.splitn(2, ['-', '_']);
    let language = parts.next().unwrap_or_default();
    let country = parts
        .next()
        .map(|rest| rest.split(['-', '_']).next().unwrap_or(rest))
        .filter(|c| !c.is_empty());
    (language, country)
}
