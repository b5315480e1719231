//! The in-memory score: song metadata, ordered sections, and per-section
//! tracks of timed events.
//!
//! A score is built once by the parser (or loaded from a saved project) and
//! never mutated afterwards. Everything here is read-only queries, validation
//! and persistence.

mod event;
mod percussion;
mod pitch;
mod validate;

pub use event::{
    Chord, DrumHit, DrumPattern, Duration, Dynamic, Event, EventKind, NoteValue, SingleNote,
    DIVISIONS_PER_QUARTER, DRUM_HIT_DIVISIONS,
};
pub use percussion::{canonical_drum_name, drum_key};
pub use pitch::{ChordQuality, Key, Mode, PitchName};
pub use validate::Violation;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Tempo used when the notation gives none.
pub const DEFAULT_TEMPO: u32 = 120;

/// Slowest tempo a score may carry.
pub const MIN_TEMPO: u32 = 20;

/// Fastest tempo a score may carry.
pub const MAX_TEMPO: u32 = 400;

/// Bar count used when a section header gives none.
pub const DEFAULT_BARS: u32 = 8;

/// Converts score divisions to MIDI ticks at `ticks_per_quarter`.
///
/// Onsets and ends are converted separately (never lengths), so rounding
/// can't push a note past its section. Saturates at `u32::MAX`.
pub fn divisions_to_ticks(divisions: u32, ticks_per_quarter: u16) -> u32 {
    let ticks = divisions as u64 * ticks_per_quarter as u64 / DIVISIONS_PER_QUARTER as u64;
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

/// Time signature as written, e.g. 6/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Parses `3/4`, `6 / 8`, tolerating trailing punctuation.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_end_matches(['.', ',', ';']);
        let (num, den) = text.split_once('/')?;
        let numerator = num.trim().parse().ok()?;
        let denominator = den.trim().parse().ok()?;
        Some(Self::new(numerator, denominator))
    }

    /// Numerator at least 1, denominator a power of two from 1 to 32.
    pub fn is_valid(&self) -> bool {
        self.numerator >= 1 && matches!(self.denominator, 1 | 2 | 4 | 8 | 16 | 32)
    }

    /// Denominator as a power of two, the form MIDI stores it in.
    pub fn denominator_power(&self) -> u8 {
        self.denominator.max(1).trailing_zeros() as u8
    }

    /// Length of one beat (the denominator's note value) in divisions.
    pub fn beat_divisions(&self) -> u32 {
        DIVISIONS_PER_QUARTER * 4 / self.denominator.max(1) as u32
    }

    /// Length of one bar in divisions.
    pub fn bar_divisions(&self) -> u32 {
        self.beat_divisions() * self.numerator as u32
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// An instrument's part within one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    name: String,
    events: Vec<Event>,
}

impl Track {
    pub fn new(name: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    /// Instrument or role label, as written (the parser upper-cases it).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events in onset order of the notation.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// True when the track has drum events and nothing pitched.
    pub fn is_drum_only(&self) -> bool {
        let mut any_drum = false;
        for event in &self.events {
            match event.kind() {
                EventKind::Drum(_) => any_drum = true,
                EventKind::Rest(_) => {}
                _ => return false,
            }
        }
        any_drum
    }
}

/// A named stretch of the song with a fixed number of bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    name: String,
    bars: u32,
    tracks: Vec<Track>,
}

impl Section {
    pub fn new(name: impl Into<String>, bars: u32, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            bars,
            tracks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }

    /// Tracks in the order they first appeared in the section.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Looks a track up by exact name.
    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    /// Section length (bars × bar length) in divisions.
    pub fn length_divisions(&self, time_signature: TimeSignature) -> u32 {
        self.bars.saturating_mul(time_signature.bar_divisions())
    }

    /// Number of events across all tracks.
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}

/// All the parts one instrument plays across the song.
///
/// Tracks with the same name in different sections are the same logical
/// instrument; each part keeps pointing at its own section's track.
#[derive(Debug, Clone)]
pub struct LogicalTrack<'a> {
    pub name: &'a str,
    /// `(section index, track)` pairs in section order.
    pub parts: Vec<(usize, &'a Track)>,
}

impl LogicalTrack<'_> {
    /// True when every part is drum-only.
    pub fn is_drum_only(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|(_, t)| t.is_drum_only())
    }
}

/// A complete song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    title: String,
    tempo: u32,
    key: String,
    time_signature: TimeSignature,
    sections: Vec<Section>,
}

impl Score {
    pub fn new(
        title: impl Into<String>,
        tempo: u32,
        key: impl Into<String>,
        time_signature: TimeSignature,
        sections: Vec<Section>,
    ) -> Self {
        Self {
            title: title.into(),
            tempo,
            key: key.into(),
            time_signature,
            sections,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Tempo in beats per minute.
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Key name; canonical (`Am`, `Bb`) when it was recognized.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The key, when its name is one [`Key::parse`] understands.
    pub fn parsed_key(&self) -> Option<Key> {
        Key::parse(&self.key)
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Length of section `index` in divisions.
    pub fn section_divisions(&self, index: usize) -> Option<u32> {
        self.sections
            .get(index)
            .map(|s| s.length_divisions(self.time_signature))
    }

    /// Length of section `index` in MIDI ticks.
    pub fn section_ticks(&self, index: usize, ticks_per_quarter: u16) -> Option<u32> {
        let start = *self.section_offsets().get(index)?;
        let end = start.saturating_add(self.section_divisions(index)?);
        Some(divisions_to_ticks(end, ticks_per_quarter) - divisions_to_ticks(start, ticks_per_quarter))
    }

    /// Start of each section, in divisions from the top of the song.
    pub fn section_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.sections.len());
        let mut position = 0u32;
        for section in &self.sections {
            offsets.push(position);
            position = position.saturating_add(section.length_divisions(self.time_signature));
        }
        offsets
    }

    /// Length of the whole song in divisions.
    pub fn total_divisions(&self) -> u32 {
        self.sections
            .iter()
            .map(|s| s.length_divisions(self.time_signature))
            .fold(0u32, |acc, len| acc.saturating_add(len))
    }

    /// Total number of bars.
    pub fn total_bars(&self) -> u32 {
        self.sections
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.bars))
    }

    /// Playing time in seconds at the score's tempo.
    pub fn duration_seconds(&self) -> f64 {
        let quarters = self.total_divisions() as f64 / DIVISIONS_PER_QUARTER as f64;
        quarters * 60.0 / self.tempo.max(1) as f64
    }

    /// Groups tracks by name across sections, in order of first appearance.
    ///
    /// ```
    /// use tunescript::parse;
    ///
    /// let (score, _) = parse(
    ///     "SECTION: A [1 bar]\n  PIANO: C(w)\nSECTION: B [1 bar]\n  BASS: C2(w)\n  PIANO: F(w)",
    /// )
    /// .unwrap();
    /// let tracks = score.logical_tracks();
    /// assert_eq!(tracks[0].name, "PIANO");
    /// assert_eq!(tracks[0].parts.len(), 2);
    /// assert_eq!(tracks[1].name, "BASS");
    /// ```
    pub fn logical_tracks(&self) -> Vec<LogicalTrack<'_>> {
        let mut groups: Vec<LogicalTrack<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (section_index, section) in self.sections.iter().enumerate() {
            for track in &section.tracks {
                let slot = *index.entry(track.name()).or_insert_with(|| {
                    groups.push(LogicalTrack {
                        name: track.name(),
                        parts: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[slot].parts.push((section_index, track));
            }
        }
        groups
    }

    /// Checks every structural invariant, returning all violations found.
    /// An empty list means the score can be encoded.
    pub fn validate(&self) -> Vec<Violation> {
        validate::validate(self)
    }

    /// Serializes the score to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a score from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Saves the score to a JSON project file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads a score from a JSON project file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Saves the score in the compact binary format.
    pub fn save_to_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = bincode::serialize(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Loads a score saved with [`Score::save_to_binary`].
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}
