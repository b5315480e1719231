//! Musical events: chords, single notes, drum patterns and rests.
//!
//! Times inside a score are counted in divisions, [`DIVISIONS_PER_QUARTER`]
//! to a quarter note. That grid is fine enough for every duration the
//! notation allows (dotted sixteenths and eighth triplets included), so onsets
//! never accumulate rounding error; conversion to MIDI ticks happens once, in
//! the encoder.

use super::pitch::{ChordQuality, PitchName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score time resolution: divisions per quarter note.
pub const DIVISIONS_PER_QUARTER: u32 = 48;

/// Sounding length of a single drum hit (a sixteenth note).
pub const DRUM_HIT_DIVISIONS: u32 = DIVISIONS_PER_QUARTER / 4;

/// Base note values of the duration grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    /// One note of an eighth-note triplet (a third of a quarter).
    EighthTriplet,
}

impl NoteValue {
    /// Length in divisions.
    pub fn divisions(&self) -> u32 {
        match self {
            NoteValue::Whole => DIVISIONS_PER_QUARTER * 4,
            NoteValue::Half => DIVISIONS_PER_QUARTER * 2,
            NoteValue::Quarter => DIVISIONS_PER_QUARTER,
            NoteValue::Eighth => DIVISIONS_PER_QUARTER / 2,
            NoteValue::Sixteenth => DIVISIONS_PER_QUARTER / 4,
            NoteValue::EighthTriplet => DIVISIONS_PER_QUARTER / 3,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            NoteValue::Whole => "w",
            NoteValue::Half => "h",
            NoteValue::Quarter => "q",
            NoteValue::Eighth => "e",
            NoteValue::Sixteenth => "s",
            NoteValue::EighthTriplet => "t",
        }
    }

    /// Parses a single note-value word or letter (`q`, `quarter`, `8th`).
    pub fn parse(text: &str) -> Option<Self> {
        let value = match text {
            "w" | "whole" | "1" => NoteValue::Whole,
            "h" | "half" | "2" => NoteValue::Half,
            "q" | "quarter" | "quarters" | "4th" | "4ths" | "4" => NoteValue::Quarter,
            "e" | "eighth" | "eighths" | "8th" | "8ths" | "8" => NoteValue::Eighth,
            "s" | "sixteenth" | "sixteenths" | "16th" | "16ths" | "16" => NoteValue::Sixteenth,
            "t" | "triplet" | "triplets" => NoteValue::EighthTriplet,
            _ => return None,
        };
        Some(value)
    }
}

/// A symbolic duration: a note value, optionally dotted, optionally tied to a
/// further duration (`h~q`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub value: NoteValue,
    pub dotted: bool,
    pub tie: Option<Box<Duration>>,
}

impl Duration {
    /// A plain, undotted duration.
    pub fn new(value: NoteValue) -> Self {
        Self {
            value,
            dotted: false,
            tie: None,
        }
    }

    /// A dotted duration (one and a half times the value).
    pub fn dotted(value: NoteValue) -> Self {
        Self {
            value,
            dotted: true,
            tie: None,
        }
    }

    /// Ties `next` onto the end of this duration chain.
    pub fn tied(mut self, next: Duration) -> Self {
        self.tie = Some(Box::new(match self.tie.take() {
            Some(existing) => existing.tied(next),
            None => next,
        }));
        self
    }

    /// Total length in divisions, including dots and ties.
    pub fn divisions(&self) -> u32 {
        let base = self.value.divisions();
        let own = if self.dotted { base + base / 2 } else { base };
        own + self.tie.as_ref().map_or(0, |t| t.divisions())
    }

    /// Parses a duration argument.
    ///
    /// Accepts note-value letters or words, a dot written as a `d` prefix or
    /// `.` suffix (`dq`, `q.`), and ties joined with `~` or `+` (`h~q`).
    ///
    /// ```
    /// use tunescript::score::{Duration, DIVISIONS_PER_QUARTER};
    ///
    /// let d = Duration::parse("h~dq").unwrap();
    /// assert_eq!(d.divisions(), DIVISIONS_PER_QUARTER * 2 + DIVISIONS_PER_QUARTER * 3 / 2);
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        let mut parts = text.split(['~', '+']);
        let mut duration = Self::parse_single(parts.next()?)?;
        for part in parts {
            duration = duration.tied(Self::parse_single(part)?);
        }
        Some(duration)
    }

    fn parse_single(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(value) = NoteValue::parse(text) {
            return Some(Self::new(value));
        }
        let undotted = text
            .strip_suffix('.')
            .or_else(|| text.strip_prefix("dotted "))
            .or_else(|| text.strip_prefix("dotted_"))
            .or_else(|| text.strip_prefix('d'))?;
        NoteValue::parse(undotted.trim()).map(Self::dotted)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dotted {
            write!(f, "d")?;
        }
        write!(f, "{}", self.value.symbol())?;
        if let Some(tie) = &self.tie {
            write!(f, "~{}", tie)?;
        }
        Ok(())
    }
}

/// Dynamic markings, ordered softest to loudest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    #[default]
    Mf,
    F,
    Ff,
    Fff,
}

impl Dynamic {
    /// Every dynamic, softest first.
    pub const ALL: [Dynamic; 8] = [
        Dynamic::Ppp,
        Dynamic::Pp,
        Dynamic::P,
        Dynamic::Mp,
        Dynamic::Mf,
        Dynamic::F,
        Dynamic::Ff,
        Dynamic::Fff,
    ];

    /// Position in [`Dynamic::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Parses a dynamic marking (`mf`, `FF`).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        Dynamic::ALL.into_iter().find(|d| d.symbol() == text)
    }

    /// Conventional lower-case symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Dynamic::Ppp => "ppp",
            Dynamic::Pp => "pp",
            Dynamic::P => "p",
            Dynamic::Mp => "mp",
            Dynamic::Mf => "mf",
            Dynamic::F => "f",
            Dynamic::Ff => "ff",
            Dynamic::Fff => "fff",
        }
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Where a drum sounds within each bar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumPattern {
    /// Explicit offsets from the bar line, in divisions, ascending.
    Beats(Vec<u32>),
    /// One hit on every subdivision of the given value.
    Every(NoteValue),
}

impl DrumPattern {
    /// Hit offsets inside one bar of `bar_divisions`.
    pub fn offsets_in_bar(&self, bar_divisions: u32) -> Vec<u32> {
        match self {
            DrumPattern::Beats(offsets) => offsets
                .iter()
                .copied()
                .filter(|o| *o < bar_divisions)
                .collect(),
            DrumPattern::Every(value) => {
                let step = value.divisions().max(1);
                (0..bar_divisions).step_by(step as usize).collect()
            }
        }
    }
}

/// A chord symbol resolved to a root, quality and octave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chord {
    pub root: PitchName,
    pub quality: ChordQuality,
    /// Octave of the root; either written in the token or taken from the
    /// track's default register.
    pub octave: i8,
    pub duration: Duration,
}

/// One pitched note with an explicit octave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SingleNote {
    pub pitch: PitchName,
    pub octave: i8,
    pub duration: Duration,
}

/// A percussion instrument and the pattern it plays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrumHit {
    /// Canonical drum name, e.g. `kick` or `open_hat`.
    pub instrument: String,
    /// GM percussion key.
    pub key: u8,
    pub pattern: DrumPattern,
}

/// The variant part of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Chord(Chord),
    Note(SingleNote),
    Drum(DrumHit),
    /// A rest; `None` is a whole-bar rest (`_`).
    Rest(Option<Duration>),
}

/// A timed event inside a section's track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    onset: u32,
    length: u32,
    dynamic: Dynamic,
    kind: EventKind,
}

impl Event {
    /// Creates an event starting `onset` divisions into its section and
    /// lasting `length` divisions (already clipped to the section).
    pub fn new(kind: EventKind, onset: u32, length: u32, dynamic: Dynamic) -> Self {
        Self {
            onset,
            length,
            dynamic,
            kind,
        }
    }

    pub fn onset(&self) -> u32 {
        self.onset
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// End offset (onset + length).
    pub fn end(&self) -> u32 {
        self.onset.saturating_add(self.length)
    }

    pub fn dynamic(&self) -> Dynamic {
        self.dynamic
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn is_drum(&self) -> bool {
        matches!(self.kind, EventKind::Drum(_))
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, EventKind::Rest(_))
    }

    /// MIDI pitch numbers this event sounds, before any range check.
    ///
    /// Chords yield one pitch per chord tone, drums their percussion key,
    /// rests nothing.
    pub fn resolved_pitches(&self) -> Vec<i16> {
        match &self.kind {
            EventKind::Chord(chord) => {
                let root = chord.root.midi_number(chord.octave);
                chord
                    .quality
                    .intervals()
                    .iter()
                    .map(|i| root + i)
                    .collect()
            }
            EventKind::Note(note) => vec![note.pitch.midi_number(note.octave)],
            EventKind::Drum(hit) => vec![hit.key as i16],
            EventKind::Rest(_) => Vec::new(),
        }
    }

    /// Whether at least one resolved pitch lies in the MIDI range.
    pub fn has_playable_pitch(&self) -> bool {
        self.resolved_pitches()
            .iter()
            .any(|p| (0..=127).contains(p))
    }

    /// Section-relative offsets of every drum hit this event plays.
    ///
    /// The pattern restarts every `bar_divisions` from the event's onset and
    /// stops at the event's end. Non-drum events return nothing.
    pub fn drum_hits(&self, bar_divisions: u32) -> Vec<u32> {
        let EventKind::Drum(hit) = &self.kind else {
            return Vec::new();
        };
        if bar_divisions == 0 {
            return Vec::new();
        }
        let in_bar = hit.pattern.offsets_in_bar(bar_divisions);
        let mut hits = Vec::new();
        let mut bar_start = self.onset;
        while bar_start < self.end() {
            hits.extend(
                in_bar
                    .iter()
                    .map(|o| bar_start + o)
                    .take_while(|t| *t < self.end()),
            );
            bar_start += bar_divisions;
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parse() {
        assert_eq!(Duration::parse("w").unwrap().divisions(), 192);
        assert_eq!(Duration::parse("q").unwrap().divisions(), 48);
        assert_eq!(Duration::parse("dq").unwrap().divisions(), 72);
        assert_eq!(Duration::parse("q.").unwrap().divisions(), 72);
        assert_eq!(Duration::parse("dh").unwrap().divisions(), 144);
        assert_eq!(Duration::parse("de").unwrap().divisions(), 36);
        assert_eq!(Duration::parse("t").unwrap().divisions(), 16);
        assert_eq!(Duration::parse("Half").unwrap().divisions(), 96);
        assert_eq!(Duration::parse("w~h").unwrap().divisions(), 288);
        assert_eq!(Duration::parse("q+e+s").unwrap().divisions(), 84);
        assert!(Duration::parse("mf").is_none());
        assert!(Duration::parse("x").is_none());
        assert!(Duration::parse("").is_none());
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Duration::parse("h~dq").unwrap().to_string(), "h~dq");
    }

    #[test]
    fn test_dynamic_order_and_parse() {
        assert!(Dynamic::Ppp < Dynamic::Fff);
        assert_eq!(Dynamic::parse("MF"), Some(Dynamic::Mf));
        assert_eq!(Dynamic::parse("q"), None);
        assert_eq!(Dynamic::default(), Dynamic::Mf);
        for (i, d) in Dynamic::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }

    #[test]
    fn test_chord_pitches() {
        let chord = Chord {
            root: PitchName::new('A', 0).unwrap(),
            quality: ChordQuality::Minor,
            octave: 4,
            duration: Duration::new(NoteValue::Whole),
        };
        let event = Event::new(EventKind::Chord(chord), 0, 192, Dynamic::Mf);
        assert_eq!(event.resolved_pitches(), vec![69, 72, 76]);
        assert!(event.has_playable_pitch());
    }

    #[test]
    fn test_unplayable_note() {
        let note = SingleNote {
            pitch: PitchName::new('B', 0).unwrap(),
            octave: 10,
            duration: Duration::new(NoteValue::Quarter),
        };
        let event = Event::new(EventKind::Note(note), 0, 48, Dynamic::Mf);
        assert!(!event.has_playable_pitch());
    }

    #[test]
    fn test_drum_hits_repeat_per_bar() {
        let hit = DrumHit {
            instrument: "kick".into(),
            key: 36,
            pattern: DrumPattern::Beats(vec![0, 96]),
        };
        // Two bars of 4/4.
        let event = Event::new(EventKind::Drum(hit), 0, 384, Dynamic::F);
        assert_eq!(event.drum_hits(192), vec![0, 96, 192, 288]);
    }

    #[test]
    fn test_drum_every_eighth() {
        let hit = DrumHit {
            instrument: "hat".into(),
            key: 42,
            pattern: DrumPattern::Every(NoteValue::Eighth),
        };
        let event = Event::new(EventKind::Drum(hit), 0, 192, Dynamic::Mf);
        assert_eq!(event.drum_hits(192).len(), 8);
        assert!(Event::new(EventKind::Rest(None), 0, 192, Dynamic::Mf)
            .drum_hits(192)
            .is_empty());
    }
}
