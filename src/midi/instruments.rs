//! Track name to General MIDI instrument mapping.
//!
//! The keyword table is plain configuration data: the built-in one is
//! constructed once on first use and shared read-only, and callers can pass
//! their own through [`EncodeOptions`](super::EncodeOptions).

use super::{PERCUSSION_BANK, PERCUSSION_CHANNEL};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// What a keyword maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    /// A melodic General MIDI program (0-127).
    Program(u8),
    /// The drum kit on the percussion channel.
    Percussion,
}

/// One keyword of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentEntry {
    /// Lower-case keyword, words joined by underscores (`electric_piano`).
    pub keyword: String,
    pub voice: Voice,
}

/// Keyword table from track names to GM voices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMap {
    entries: Vec<InstrumentEntry>,
    /// Program used when no keyword matches.
    #[serde(default)]
    default_program: u8,
}

const GENERAL_MIDI_KEYWORDS: &[(&str, Voice)] = &[
    // Piano
    ("piano", Voice::Program(0)),
    ("keys", Voice::Program(0)),
    ("keyboard", Voice::Program(0)),
    ("bright_piano", Voice::Program(1)),
    ("honkytonk", Voice::Program(3)),
    ("electric_piano", Voice::Program(4)),
    ("epiano", Voice::Program(4)),
    ("rhodes", Voice::Program(4)),
    // Chromatic percussion
    ("celesta", Voice::Program(8)),
    ("glockenspiel", Voice::Program(9)),
    ("music_box", Voice::Program(10)),
    ("vibraphone", Voice::Program(11)),
    ("marimba", Voice::Program(12)),
    ("xylophone", Voice::Program(13)),
    // Organ
    ("organ", Voice::Program(19)),
    ("church_organ", Voice::Program(19)),
    ("rock_organ", Voice::Program(18)),
    // Guitar
    ("guitar", Voice::Program(25)),
    ("gtr", Voice::Program(25)),
    ("acoustic_guitar", Voice::Program(24)),
    ("electric_guitar", Voice::Program(27)),
    ("clean_guitar", Voice::Program(27)),
    ("distortion_guitar", Voice::Program(30)),
    // Bass
    ("bass", Voice::Program(33)),
    ("bass_guitar", Voice::Program(33)),
    ("acoustic_bass", Voice::Program(32)),
    ("electric_bass", Voice::Program(33)),
    ("slap_bass", Voice::Program(36)),
    ("synth_bass", Voice::Program(38)),
    // Strings
    ("violin", Voice::Program(40)),
    ("viola", Voice::Program(41)),
    ("cello", Voice::Program(42)),
    ("contrabass", Voice::Program(43)),
    ("tremolo_strings", Voice::Program(44)),
    ("pizzicato", Voice::Program(45)),
    ("harp", Voice::Program(46)),
    // Ensemble
    ("strings", Voice::Program(48)),
    ("string_ensemble", Voice::Program(48)),
    ("synth_strings", Voice::Program(50)),
    ("choir", Voice::Program(52)),
    ("voice", Voice::Program(54)),
    ("vox", Voice::Program(54)),
    ("vocals", Voice::Program(54)),
    // Brass
    ("trumpet", Voice::Program(56)),
    ("trombone", Voice::Program(57)),
    ("tuba", Voice::Program(58)),
    ("french_horn", Voice::Program(60)),
    ("brass", Voice::Program(61)),
    ("horns", Voice::Program(61)),
    ("synth_brass", Voice::Program(62)),
    // Reed
    ("sax", Voice::Program(65)),
    ("saxophone", Voice::Program(65)),
    ("alto_sax", Voice::Program(65)),
    ("tenor_sax", Voice::Program(66)),
    ("oboe", Voice::Program(68)),
    ("clarinet", Voice::Program(71)),
    // Pipe
    ("flute", Voice::Program(73)),
    ("woodwinds", Voice::Program(73)),
    ("recorder", Voice::Program(74)),
    ("pan_flute", Voice::Program(75)),
    // Synth lead
    ("lead", Voice::Program(80)),
    ("square_lead", Voice::Program(80)),
    ("saw_lead", Voice::Program(81)),
    ("synth_lead", Voice::Program(81)),
    ("synth", Voice::Program(81)),
    ("synths", Voice::Program(81)),
    // Synth pad
    ("pad", Voice::Program(88)),
    ("pads", Voice::Program(88)),
    ("new_age_pad", Voice::Program(88)),
    ("ambient", Voice::Program(88)),
    ("warm_pad", Voice::Program(89)),
    ("polysynth", Voice::Program(90)),
    ("space_pad", Voice::Program(91)),
    ("atmosphere", Voice::Program(99)),
    // Effects
    ("fx", Voice::Program(96)),
    ("rain", Voice::Program(96)),
    ("soundtrack", Voice::Program(97)),
    ("crystal", Voice::Program(98)),
    // Drum kit
    ("drums", Voice::Percussion),
    ("drum", Voice::Percussion),
    ("percussion", Voice::Percussion),
    ("perc", Voice::Percussion),
    ("kit", Voice::Percussion),
    ("beat", Voice::Percussion),
];

static GENERAL_MIDI: Lazy<InstrumentMap> = Lazy::new(|| {
    InstrumentMap::new(
        GENERAL_MIDI_KEYWORDS
            .iter()
            .map(|(keyword, voice)| InstrumentEntry {
                keyword: keyword.to_string(),
                voice: *voice,
            })
            .collect(),
        0,
    )
});

/// Lower-cases a track name and joins its words with underscores.
fn normalize(name: &str) -> String {
    let lowered: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    lowered
        .split('_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl InstrumentMap {
    /// Builds a map from entries; keywords are normalized like track names.
    pub fn new(entries: Vec<InstrumentEntry>, default_program: u8) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| InstrumentEntry {
                keyword: normalize(&e.keyword),
                voice: e.voice,
            })
            .collect();
        Self {
            entries,
            default_program: default_program.min(127),
        }
    }

    /// The built-in General MIDI keyword table.
    pub fn general_midi() -> &'static InstrumentMap {
        &GENERAL_MIDI
    }

    pub fn entries(&self) -> &[InstrumentEntry] {
        &self.entries
    }

    pub fn default_program(&self) -> u8 {
        self.default_program
    }

    /// Finds the entry for a track name.
    ///
    /// An exact keyword match wins; otherwise the longest keyword contained
    /// in the name (`"STRINGS 2"` → `strings`). Earlier entries win ties.
    pub fn lookup(&self, track_name: &str) -> Option<&InstrumentEntry> {
        let name = normalize(track_name);
        if name.is_empty() {
            return None;
        }
        if let Some(entry) = self.entries.iter().find(|e| e.keyword == name) {
            return Some(entry);
        }
        self.entries
            .iter()
            .filter(|e| !e.keyword.is_empty() && name.contains(e.keyword.as_str()))
            .fold(None, |best: Option<&InstrumentEntry>, e| match best {
                Some(b) if b.keyword.len() >= e.keyword.len() => Some(b),
                _ => Some(e),
            })
    }
}

impl Default for InstrumentMap {
    fn default() -> Self {
        Self::general_midi().clone()
    }
}

/// The instrument decision for one logical track, shared with playback
/// collaborators so they can pick matching SoundFont presets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentAssignment {
    /// Track name as it appears in the score.
    pub track: String,
    /// Zero-based MIDI channel.
    pub channel: u8,
    /// SoundFont bank (128 for the drum kit, 0 otherwise).
    pub bank: u16,
    pub program: u8,
    pub percussion: bool,
    /// Keyword that matched, or `None` when the default program was used.
    pub matched_keyword: Option<String>,
}

/// Assigns instruments and channels to logical tracks in order.
///
/// Melodic tracks take channels 0-15 in turn, skipping the percussion
/// channel and wrapping around once all are used. Percussion tracks
/// (by keyword, or because they only hold drum events) all share channel 9.
pub(crate) struct ChannelAllocator {
    next_channel: u8,
}

impl ChannelAllocator {
    pub(crate) fn new() -> Self {
        Self { next_channel: 0 }
    }

    pub(crate) fn assign(
        &mut self,
        map: &InstrumentMap,
        track_name: &str,
        drum_only: bool,
    ) -> InstrumentAssignment {
        let entry = map.lookup(track_name);
        let percussion = drum_only || matches!(entry, Some(e) if e.voice == Voice::Percussion);
        if percussion {
            return InstrumentAssignment {
                track: track_name.to_string(),
                channel: PERCUSSION_CHANNEL,
                bank: PERCUSSION_BANK,
                program: 0,
                percussion: true,
                matched_keyword: entry.map(|e| e.keyword.clone()),
            };
        }

        let channel = self.next_channel;
        // Skip drum channel (9) for melodic tracks
        self.next_channel = if self.next_channel == 8 {
            10
        } else if self.next_channel >= 15 {
            0 // Wrap around (multiple tracks can share channels)
        } else {
            self.next_channel + 1
        };

        let (program, matched_keyword) = match entry {
            Some(InstrumentEntry {
                keyword,
                voice: Voice::Program(program),
            }) => ((*program).min(127), Some(keyword.clone())),
            _ => (map.default_program, None),
        };
        InstrumentAssignment {
            track: track_name.to_string(),
            channel,
            bank: 0,
            program,
            percussion: false,
            matched_keyword,
        }
    }
}
