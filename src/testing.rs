//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::assets::AssetSource;
use crate::audio::{AudioFormat, AudioSink, SinkError};
use crate::dictionary::{DictionaryCategory, DictionaryEntry, DictionaryFile};
use crate::settings::{NumberMode, PauseSettings};
use crate::{EngineError, SpeechEngine};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Dictionary document with one entry per `(grapheme, phoneme)` pair.
pub fn dictionary_json(entries: &[(&str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = entries
        .iter()
        .map(|(g, p)| serde_json::json!({ "grapheme": g, "phoneme": p }))
        .collect();
    serde_json::json!({ "version": "1.0", "entries": entries }).to_string()
}

/// Every call the service made into the engine, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LoadVoice(String),
    Shutdown,
    Synthesize(String),
    SynthesizeSpelled(String),
    Speed(f32),
    Pitch(f32),
    BasePitch(f32),
    Volume(f32),
    Inflection(bool),
    Cancel,
    LoadDictionary(DictionaryCategory),
    AddPronunciation(String),
    Emoji(bool),
    Pauses(PauseSettings),
    NumberMode(NumberMode),
}

struct ProbeState {
    calls: Vec<Call>,
    dictionaries: HashMap<DictionaryCategory, Vec<DictionaryEntry>>,
    rejected: HashSet<DictionaryCategory>,
    ready: bool,
    fail_voice_load: bool,
    fail_synthesis: bool,
    synth_delay: Option<Duration>,
    output_len: usize,
    pauses: PauseSettings,
    number_mode: NumberMode,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            dictionaries: HashMap::new(),
            rejected: HashSet::new(),
            ready: false,
            fail_voice_load: false,
            fail_synthesis: false,
            synth_delay: None,
            output_len: 3000,
            pauses: PauseSettings::default(),
            number_mode: NumberMode::Whole,
        }
    }
}

/// Test-side handle onto a [`ScriptedEngine`] that has been moved into a
/// manager.
#[derive(Clone, Default)]
pub struct EngineProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matches(c)).count()
    }

    /// Voice data payloads loaded so far.
    pub fn loaded_voices(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::LoadVoice(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn dictionary_loads(&self) -> Vec<DictionaryCategory> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::LoadDictionary(category) => Some(*category),
                _ => None,
            })
            .collect()
    }

    pub fn dictionary_len(&self, category: DictionaryCategory) -> usize {
        self.state
            .lock()
            .dictionaries
            .get(&category)
            .map_or(0, Vec::len)
    }

    pub fn reject_dictionary(&self, category: DictionaryCategory) {
        self.state.lock().rejected.insert(category);
    }

    pub fn fail_voice_load(&self, fail: bool) {
        self.state.lock().fail_voice_load = fail;
    }

    pub fn fail_synthesis(&self, fail: bool) {
        self.state.lock().fail_synthesis = fail;
    }

    /// Make each synthesis take `delay`, polling the cancel token meanwhile.
    pub fn set_synth_delay(&self, delay: Duration) {
        self.state.lock().synth_delay = Some(delay);
    }

    /// Number of samples each synthesis returns.
    pub fn set_output_len(&self, samples: usize) {
        self.state.lock().output_len = samples;
    }

    /// Drop the native engine as if the process lost it.
    pub fn lose_engine(&self) {
        self.state.lock().ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Last value written through the setter `pick` matches.
    pub fn last(&self, pick: impl Fn(&Call) -> Option<f32>) -> Option<f32> {
        self.state.lock().calls.iter().rev().find_map(pick)
    }
}

/// In-memory engine that records its calls and returns canned audio.
pub struct ScriptedEngine {
    probe: EngineProbe,
}

impl ScriptedEngine {
    pub fn new() -> (Self, EngineProbe) {
        let probe = EngineProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }

    fn record(&self, call: Call) {
        self.probe.state.lock().calls.push(call);
    }

    fn render(&self, cancel: &CancellationToken) -> Result<Vec<i16>, EngineError> {
        let (ready, fail, delay, len) = {
            let s = self.probe.state.lock();
            (s.ready, s.fail_synthesis, s.synth_delay, s.output_len)
        };
        if !ready {
            return Err(EngineError::NotInitialized);
        }
        if let Some(delay) = delay {
            let step = Duration::from_millis(2);
            let mut waited = Duration::ZERO;
            while waited < delay {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                std::thread::sleep(step);
                waited += step;
            }
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if fail {
            return Err(EngineError::Synthesis("scripted failure".into()));
        }
        Ok((0..len).map(|i| (i % 512) as i16).collect())
    }
}

impl SpeechEngine for ScriptedEngine {
    fn load_voice_data(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.record(Call::LoadVoice(String::from_utf8_lossy(data).into_owned()));
        let mut s = self.probe.state.lock();
        if s.fail_voice_load || data.is_empty() {
            s.ready = false;
            return Err(EngineError::InvalidVoiceData("scripted rejection".into()));
        }
        s.ready = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.record(Call::Shutdown);
        self.probe.state.lock().ready = false;
    }

    fn is_ready(&self) -> bool {
        self.probe.is_ready()
    }

    fn synthesize(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<i16>, EngineError> {
        self.record(Call::Synthesize(text.to_string()));
        self.render(cancel)
    }

    fn synthesize_spelled(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<i16>, EngineError> {
        self.record(Call::SynthesizeSpelled(text.to_string()));
        self.render(cancel)
    }

    fn set_speed(&mut self, speed: f32) {
        self.record(Call::Speed(speed));
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.record(Call::Pitch(pitch));
    }

    fn set_base_pitch(&mut self, multiplier: f32) {
        self.record(Call::BasePitch(multiplier));
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(Call::Volume(volume));
    }

    fn set_inflection_enabled(&mut self, enabled: bool) {
        self.record(Call::Inflection(enabled));
    }

    fn cancel(&mut self) {
        self.record(Call::Cancel);
    }

    fn load_dictionary(
        &mut self,
        category: DictionaryCategory,
        json: &[u8],
    ) -> Result<usize, EngineError> {
        self.record(Call::LoadDictionary(category));
        let mut s = self.probe.state.lock();
        if s.rejected.contains(&category) {
            return Err(EngineError::DictionaryRejected(format!(
                "{category} rejected by script"
            )));
        }
        let file = DictionaryFile::parse(json)
            .map_err(|e| EngineError::DictionaryRejected(e.to_string()))?;
        let count = file.entries.len();
        s.dictionaries.insert(category, file.entries);
        Ok(count)
    }

    fn add_pronunciation(&mut self, entry: &DictionaryEntry) {
        self.record(Call::AddPronunciation(entry.grapheme.clone()));
        self.probe
            .state
            .lock()
            .dictionaries
            .entry(DictionaryCategory::Pronunciation)
            .or_default()
            .push(entry.clone());
    }

    fn set_emoji_enabled(&mut self, enabled: bool) {
        self.record(Call::Emoji(enabled));
    }

    fn set_pauses(&mut self, pauses: PauseSettings) {
        self.record(Call::Pauses(pauses));
        self.probe.state.lock().pauses = pauses;
    }

    fn pauses(&self) -> PauseSettings {
        self.probe.state.lock().pauses
    }

    fn set_number_mode(&mut self, mode: NumberMode) {
        self.record(Call::NumberMode(mode));
        self.probe.state.lock().number_mode = mode;
    }

    fn number_mode(&self) -> NumberMode {
        self.probe.state.lock().number_mode
    }
}

/// Asset source backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    /// Both voice data files plus small bundled dictionaries.
    pub fn standard() -> Self {
        let mut assets = Self::default();
        assets.insert("Josip.bin", b"JOSIP".to_vec());
        assets.insert("Vlado.bin", b"VLADO".to_vec());
        assets.insert(
            DictionaryCategory::Pronunciation.bundled_asset(),
            dictionary_json(&[("dr.", "doktor"), ("npr.", "na primjer")]).into_bytes(),
        );
        assets.insert(
            DictionaryCategory::Spelling.bundled_asset(),
            dictionary_json(&[("a", "a"), ("č", "če"), (".", "točka")]).into_bytes(),
        );
        assets.insert(
            DictionaryCategory::Emoji.bundled_asset(),
            dictionary_json(&[("👍", "palac gore"), ("😀", "nasmijano lice")]).into_bytes(),
        );
        assets
    }

    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        self.files.insert(name.to_string(), data);
    }

    pub fn remove(&mut self, name: &str) {
        self.files.remove(name);
    }
}

impl AssetSource for MemoryAssets {
    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Start(AudioFormat),
    Chunk(usize),
    Done,
    Error,
}

/// Sink that records every signal it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
    pub bytes: Vec<u8>,
    pub reject_format: bool,
    /// Accept this many chunks, then reject the next one.
    pub reject_after_chunks: Option<usize>,
    /// Cancel the token right after this many chunks were accepted.
    pub cancel_after_chunks: Option<(usize, CancellationToken)>,
    /// Pause after each accepted chunk.
    pub write_delay: Option<Duration>,
}

impl RecordingSink {
    pub fn chunk_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Chunk(_)))
            .count()
    }

    /// Number of `done` plus `error` signals.
    pub fn terminal_signals(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Done | SinkEvent::Error))
            .count()
    }
}

#[async_trait::async_trait]
impl AudioSink for RecordingSink {
    async fn start(&mut self, format: AudioFormat) -> Result<(), SinkError> {
        if self.reject_format {
            return Err(SinkError::FormatRejected("scripted".into()));
        }
        self.events.push(SinkEvent::Start(format));
        Ok(())
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        if self.reject_after_chunks == Some(self.chunk_count()) {
            return Err(SinkError::WriteRejected("scripted".into()));
        }
        self.events.push(SinkEvent::Chunk(chunk.len()));
        self.bytes.extend_from_slice(chunk);
        if let Some((after, token)) = &self.cancel_after_chunks {
            if self.chunk_count() == *after {
                token.cancel();
            }
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn done(&mut self) {
        self.events.push(SinkEvent::Done);
    }

    async fn error(&mut self) {
        self.events.push(SinkEvent::Error);
    }
}
