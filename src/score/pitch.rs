//! Pitch spelling, chord qualities and key names.
//!
//! Pitch names keep their spelling (`Bb` stays `Bb`, it is never rewritten as
//! `A#`) so scores survive a save/load cycle unchanged; resolution to MIDI
//! numbers happens only when asked for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A spelled pitch class such as `C`, `F#` or `Bb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchName {
    /// Upper-case letter `A`..=`G`.
    pub letter: char,
    /// Sharps (positive) or flats (negative), at most two either way.
    pub accidental: i8,
}

impl PitchName {
    /// Creates a pitch name, normalizing the letter to upper case.
    ///
    /// Returns `None` for letters outside `A`..=`G` or accidentals beyond a
    /// double sharp/flat.
    pub fn new(letter: char, accidental: i8) -> Option<Self> {
        let letter = letter.to_ascii_uppercase();
        if !('A'..='G').contains(&letter) || !(-2..=2).contains(&accidental) {
            return None;
        }
        Some(Self { letter, accidental })
    }

    /// Splits a leading pitch name off `text`, returning it with the rest.
    ///
    /// The letter is case-insensitive; accidentals are `#`, `b`, `♯` and `♭`,
    /// doubled for double sharps and flats.
    ///
    /// ```
    /// use tunescript::score::PitchName;
    ///
    /// let (pitch, rest) = PitchName::split_prefix("Bbmaj7").unwrap();
    /// assert_eq!(pitch.to_string(), "Bb");
    /// assert_eq!(rest, "maj7");
    /// ```
    pub fn split_prefix(text: &str) -> Option<(Self, &str)> {
        let mut chars = text.char_indices();
        let (_, letter) = chars.next()?;
        let mut accidental = 0i8;
        let mut rest_at = letter.len_utf8();
        for (idx, c) in chars {
            let step = match c {
                '#' | '♯' => 1,
                'b' | '♭' => -1,
                _ => break,
            };
            // `Abb` is A double-flat, but never mix directions.
            if accidental != 0 && accidental.signum() != step || accidental.abs() == 2 {
                break;
            }
            accidental += step;
            rest_at = idx + c.len_utf8();
        }
        let pitch = Self::new(letter, accidental)?;
        Some((pitch, &text[rest_at..]))
    }

    /// Semitone offset from C in the same octave (may be -2..=13 for
    /// spellings such as `Cb` or `B#`).
    pub fn semitone(&self) -> i16 {
        let base = match self.letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11,
        };
        base + self.accidental as i16
    }

    /// MIDI number of this pitch in `octave` (C4 = 60). May fall outside
    /// 0..=127; callers decide whether to clamp or reject.
    pub fn midi_number(&self, octave: i8) -> i16 {
        (octave as i16 + 1) * 12 + self.semitone()
    }
}

impl fmt::Display for PitchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter)?;
        let symbol = if self.accidental > 0 { '#' } else { 'b' };
        for _ in 0..self.accidental.unsigned_abs() {
            write!(f, "{}", symbol)?;
        }
        Ok(())
    }
}

/// Chord qualities understood by the chord grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Sixth,
    MinorSixth,
    Dominant7,
    Major7,
    Minor7,
    HalfDiminished7,
    Diminished7,
    Augmented7,
    Add9,
    Dominant9,
    Major9,
    Minor9,
    Eleventh,
    Thirteenth,
}

/// Symbol spellings, checked case-sensitively first (`M7` vs `m7`), then
/// against the lower-cased symbol.
const QUALITY_SYMBOLS: &[(&str, ChordQuality)] = &[
    ("", ChordQuality::Major),
    ("M", ChordQuality::Major),
    ("maj", ChordQuality::Major),
    ("major", ChordQuality::Major),
    ("m", ChordQuality::Minor),
    ("min", ChordQuality::Minor),
    ("minor", ChordQuality::Minor),
    ("-", ChordQuality::Minor),
    ("dim", ChordQuality::Diminished),
    ("°", ChordQuality::Diminished),
    ("o", ChordQuality::Diminished),
    ("aug", ChordQuality::Augmented),
    ("+", ChordQuality::Augmented),
    ("sus2", ChordQuality::Sus2),
    ("sus4", ChordQuality::Sus4),
    ("sus", ChordQuality::Sus4),
    ("6", ChordQuality::Sixth),
    ("m6", ChordQuality::MinorSixth),
    ("min6", ChordQuality::MinorSixth),
    ("7", ChordQuality::Dominant7),
    ("dom7", ChordQuality::Dominant7),
    ("M7", ChordQuality::Major7),
    ("maj7", ChordQuality::Major7),
    ("Δ", ChordQuality::Major7),
    ("Δ7", ChordQuality::Major7),
    ("m7", ChordQuality::Minor7),
    ("min7", ChordQuality::Minor7),
    ("-7", ChordQuality::Minor7),
    ("m7b5", ChordQuality::HalfDiminished7),
    ("ø", ChordQuality::HalfDiminished7),
    ("ø7", ChordQuality::HalfDiminished7),
    ("dim7", ChordQuality::Diminished7),
    ("°7", ChordQuality::Diminished7),
    ("o7", ChordQuality::Diminished7),
    ("aug7", ChordQuality::Augmented7),
    ("+7", ChordQuality::Augmented7),
    ("7#5", ChordQuality::Augmented7),
    ("add9", ChordQuality::Add9),
    ("9", ChordQuality::Dominant9),
    ("maj9", ChordQuality::Major9),
    ("M9", ChordQuality::Major9),
    ("m9", ChordQuality::Minor9),
    ("min9", ChordQuality::Minor9),
    ("11", ChordQuality::Eleventh),
    ("13", ChordQuality::Thirteenth),
];

impl ChordQuality {
    /// Looks up a quality symbol (the text after the chord root).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let exact = QUALITY_SYMBOLS.iter().find(|(s, _)| *s == symbol);
        let folded = || {
            let lower = symbol.to_lowercase();
            QUALITY_SYMBOLS
                .iter()
                .find(|(s, _)| *s == lower)
                .map(|(_, q)| *q)
        };
        exact.map(|(_, q)| *q).or_else(folded)
    }

    /// Semitone intervals above the root.
    pub fn intervals(&self) -> &'static [i16] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Sixth => &[0, 4, 7, 9],
            ChordQuality::MinorSixth => &[0, 3, 7, 9],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::HalfDiminished7 => &[0, 3, 6, 10],
            ChordQuality::Diminished7 => &[0, 3, 6, 9],
            ChordQuality::Augmented7 => &[0, 4, 8, 10],
            ChordQuality::Add9 => &[0, 4, 7, 14],
            ChordQuality::Dominant9 => &[0, 4, 7, 10, 14],
            ChordQuality::Major9 => &[0, 4, 7, 11, 14],
            ChordQuality::Minor9 => &[0, 3, 7, 10, 14],
            ChordQuality::Eleventh => &[0, 4, 7, 10, 14, 17],
            ChordQuality::Thirteenth => &[0, 4, 7, 10, 14, 21],
        }
    }
}

/// Major or minor mode of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

/// A recognized key such as `Am` or `Eb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub tonic: PitchName,
    pub mode: Mode,
}

/// Sharps (positive) or flats (negative) for each conventional key spelling.
const MAJOR_SIGNATURES: &[(&str, i8)] = &[
    ("C", 0),
    ("G", 1),
    ("D", 2),
    ("A", 3),
    ("E", 4),
    ("B", 5),
    ("F#", 6),
    ("C#", 7),
    ("F", -1),
    ("Bb", -2),
    ("Eb", -3),
    ("Ab", -4),
    ("Db", -5),
    ("Gb", -6),
    ("Cb", -7),
];

const MINOR_SIGNATURES: &[(&str, i8)] = &[
    ("A", 0),
    ("E", 1),
    ("B", 2),
    ("F#", 3),
    ("C#", 4),
    ("G#", 5),
    ("D#", 6),
    ("A#", 7),
    ("D", -1),
    ("G", -2),
    ("C", -3),
    ("F", -4),
    ("Bb", -5),
    ("Eb", -6),
    ("Ab", -7),
];

impl Key {
    /// Parses a key name: `Am`, `A minor`, `f# min`, `Bb`, `Eb major`.
    ///
    /// Trailing punctuation is ignored. Returns `None` for anything else
    /// (modal names, free text).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_end_matches(['.', ',', ';', '!']);
        let (tonic, rest) = PitchName::split_prefix(text)?;
        let rest = rest.trim();
        let mode = match rest {
            "M" => Mode::Major,
            _ => match rest.to_lowercase().as_str() {
                "" | "maj" | "major" | "ma" => Mode::Major,
                "m" | "min" | "minor" | "mi" => Mode::Minor,
                _ => return None,
            },
        };
        Some(Self { tonic, mode })
    }

    /// Key signature as sharps (positive) or flats (negative), when the key
    /// uses a conventional spelling.
    pub fn signature(&self) -> Option<i8> {
        let table = match self.mode {
            Mode::Major => MAJOR_SIGNATURES,
            Mode::Minor => MINOR_SIGNATURES,
        };
        let tonic = self.tonic.to_string();
        table.iter().find(|(name, _)| *name == tonic).map(|(_, s)| *s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Major => write!(f, "{}", self.tonic),
            Mode::Minor => write!(f, "{}m", self.tonic),
        }
    }
}
