//! Single-character detection.
//!
//! Screen readers send one character at a time while the user moves a
//! cursor or types. Such input is spelled out by name ("č" becomes "če",
//! "." becomes "točka") instead of being read as a word.

use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Connected speech.
    Normal,
    /// Spelled through the spelling dictionary.
    Spelled,
}

/// Pick the synthesis mode for `text`.
///
/// Exactly one extended grapheme cluster selects [`SynthesisMode::Spelled`];
/// anything longer selects [`SynthesisMode::Normal`]. Empty text selects
/// neither.
pub fn dispatch(text: &str) -> Option<SynthesisMode> {
    let mut clusters = text.graphemes(true);
    match (clusters.next(), clusters.next()) {
        (None, _) => None,
        (Some(_), None) => Some(SynthesisMode::Spelled),
        (Some(_), Some(_)) => Some(SynthesisMode::Normal),
    }
}
