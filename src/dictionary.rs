//! Dictionary files and the overlay loader.
//!
//! Three categories live in the engine: pronunciation, spelling and emoji.
//! Each is loaded from bundled data in a fixed order; user-authored
//! pronunciation entries are then appended one by one, never replacing the
//! bundled set.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::AssetSource;
use crate::SpeechEngine;

pub const FILE_FORMAT_VERSION: &str = "1.0";

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid dictionary JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bundled dictionary {name} unavailable: {source}")]
    Asset {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("Engine rejected the {category} dictionary: {reason}")]
    Rejected {
        category: DictionaryCategory,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryCategory {
    Pronunciation,
    Spelling,
    Emoji,
}

impl DictionaryCategory {
    /// Order in which bundled dictionaries are loaded.
    pub const LOAD_ORDER: [Self; 3] = [Self::Pronunciation, Self::Spelling, Self::Emoji];

    /// Asset name of the bundled dictionary.
    pub fn bundled_asset(self) -> &'static str {
        match self {
            Self::Pronunciation => "dictionaries/internal.json",
            Self::Spelling => "dictionaries/spelling.json",
            Self::Emoji => "dictionaries/emoji.json",
        }
    }

    /// File name of the user-authored dictionary in the user data directory.
    pub fn user_file(self) -> &'static str {
        match self {
            Self::Pronunciation => "user.json",
            Self::Spelling => "spelling.json",
            Self::Emoji => "emoji.json",
        }
    }
}

impl fmt::Display for DictionaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pronunciation => "pronunciation",
            Self::Spelling => "spelling",
            Self::Emoji => "emoji",
        };
        f.write_str(name)
    }
}

/// One substitution rule.
///
/// `id` is an in-memory identity key; it is not written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    #[serde(skip, default = "new_entry_id")]
    pub id: String,
    pub grapheme: String,
    #[serde(default)]
    pub phoneme: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_whole_word")]
    pub whole_word: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl DictionaryEntry {
    pub fn new(grapheme: impl Into<String>, phoneme: impl Into<String>) -> Self {
        Self {
            id: new_entry_id(),
            grapheme: grapheme.into(),
            phoneme: phoneme.into(),
            case_sensitive: false,
            whole_word: true,
            comment: String::new(),
        }
    }

    /// Entries missing either side do nothing and are never sent to the engine.
    pub fn is_usable(&self) -> bool {
        !self.grapheme.is_empty() && !self.phoneme.is_empty()
    }
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_whole_word() -> bool {
    true
}

fn default_version() -> String {
    FILE_FORMAT_VERSION.to_string()
}

/// On-disk dictionary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub entries: Vec<DictionaryEntry>,
}

impl Default for DictionaryFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            entries: Vec::new(),
        }
    }
}

impl DictionaryFile {
    /// Parse a document, dropping entries with an empty grapheme.
    pub fn parse(json: &[u8]) -> Result<Self, DictionaryError> {
        let mut file: DictionaryFile = serde_json::from_slice(json)?;
        file.entries.retain(|e| !e.grapheme.is_empty());
        Ok(file)
    }

    /// Read `path`. A missing file is an empty dictionary.
    pub fn read(path: &Path) -> Result<Self, DictionaryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read(path)?;
        Self::parse(&json)
    }

    pub fn to_json(&self) -> Result<String, DictionaryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), DictionaryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// What happened during one overlay pass.
#[derive(Debug, Default)]
pub struct DictionaryLoadReport {
    /// Categories loaded from bundled data, with the engine's entry count.
    pub loaded: Vec<(DictionaryCategory, usize)>,
    /// Categories that failed; the engine keeps running without them.
    pub failed: Vec<(DictionaryCategory, DictionaryError)>,
    /// User entries appended on top of the bundled pronunciation dictionary.
    pub user_entries: usize,
    /// Set when the user file existed but could not be read.
    pub user_error: Option<DictionaryError>,
}

impl DictionaryLoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.user_error.is_none()
    }

    pub fn entry_count(&self, category: DictionaryCategory) -> Option<usize> {
        self.loaded
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, n)| *n)
    }
}

/// Load the bundled dictionaries in [`DictionaryCategory::LOAD_ORDER`], then
/// append user pronunciation entries from `user_file` when enabled.
///
/// Every failure is recorded in the report and logged; none is fatal.
pub fn load_overlay(
    engine: &mut dyn SpeechEngine,
    assets: &dyn AssetSource,
    user_file: Option<&Path>,
    user_enabled: bool,
) -> DictionaryLoadReport {
    let mut report = DictionaryLoadReport::default();

    for category in DictionaryCategory::LOAD_ORDER {
        match load_bundled(engine, assets, category) {
            Ok(count) => {
                log::info!("Loaded {category} dictionary ({count} entries)");
                report.loaded.push((category, count));
            }
            Err(e) => {
                log::error!("Failed to load {category} dictionary: {e}");
                report.failed.push((category, e));
            }
        }
    }

    if !user_enabled {
        log::debug!("User dictionaries disabled, skipping");
        return report;
    }
    let Some(path) = user_file else {
        return report;
    };
    if !path.exists() {
        log::debug!("No user dictionary at {}", path.display());
        return report;
    }

    match DictionaryFile::read(path) {
        Ok(file) => {
            for entry in file.entries.iter().filter(|e| e.is_usable()) {
                engine.add_pronunciation(entry);
                report.user_entries += 1;
            }
            log::info!("Loaded {} user dictionary entries", report.user_entries);
        }
        Err(e) => {
            log::error!("Failed to load user dictionary {}: {e}", path.display());
            report.user_error = Some(e);
        }
    }

    report
}

fn load_bundled(
    engine: &mut dyn SpeechEngine,
    assets: &dyn AssetSource,
    category: DictionaryCategory,
) -> Result<usize, DictionaryError> {
    let name = category.bundled_asset();
    let json = assets
        .read(name)
        .map_err(|source| DictionaryError::Asset { name, source })?;
    engine
        .load_dictionary(category, &json)
        .map_err(|e| DictionaryError::Rejected {
            category,
            reason: e.to_string(),
        })
}

/// A user-editable dictionary file, kept in memory between edits.
#[derive(Debug)]
pub struct UserDictionary {
    category: DictionaryCategory,
    path: PathBuf,
    entries: Vec<DictionaryEntry>,
}

impl UserDictionary {
    /// Open the `category` file inside `user_dir`. A missing file is empty.
    pub fn open(user_dir: &Path, category: DictionaryCategory) -> Result<Self, DictionaryError> {
        let path = user_dir.join(category.user_file());
        let entries = DictionaryFile::read(&path)?.entries;
        Ok(Self {
            category,
            path,
            entries,
        })
    }

    pub fn category(&self) -> DictionaryCategory {
        self.category
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    /// Update the entry with the same id, or append it.
    pub fn save_entry(&mut self, entry: DictionaryEntry) -> Result<(), DictionaryError> {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.persist()
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn delete_entry(&mut self, id: &str) -> Result<bool, DictionaryError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<(), DictionaryError> {
        let file = DictionaryFile {
            version: default_version(),
            entries: self.entries.clone(),
        };
        file.write(&self.path)
    }
}
