//! Event tokens and the grammars that read them.
//!
//! A token is a head with an optional parenthesized argument list, e.g.
//! `Am7(h,mp)` or `kick(1,3)`. Each grammar in [`GRAMMARS`] pairs a cheap
//! match test with a builder; the first grammar whose test passes owns the
//! token, even if its builder then has to fall back.

use super::report::WarningKind;
use crate::config::ParserConfig;
use crate::score::{
    canonical_drum_name, drum_key, Chord, ChordQuality, DrumHit, DrumPattern, Duration, Dynamic,
    EventKind, NoteValue, PitchName, SingleNote, TimeSignature,
};
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<head>[^\s()|,]+)\s*(?:\((?P<args>[^)]*)\))?").unwrap()
});

/// Tolerance when checking whether a drum beat lands inside the bar.
const BEAT_EPSILON: f64 = 1e-9;

/// One token as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct RawToken<'a> {
    /// The whole token, used in warnings.
    pub text: &'a str,
    pub head: &'a str,
    pub args: Option<&'a str>,
}

impl<'a> RawToken<'a> {
    fn arguments(&self) -> impl Iterator<Item = &'a str> {
        self.args
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// Splits one `|` segment into tokens.
pub(super) fn tokenize(segment: &str) -> Vec<RawToken<'_>> {
    TOKEN
        .captures_iter(segment)
        .filter_map(|caps| {
            let text = caps.get(0)?.as_str();
            Some(RawToken {
                text,
                head: caps.name("head")?.as_str(),
                args: caps.name("args").map(|m| m.as_str()),
            })
        })
        .collect()
}

/// What a token means before it is placed in time.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Interpreted {
    pub kind: EventKind,
    /// Time the token takes up in a melodic line; `None` for a one-bar rest
    /// and for drums, which are laid out per bar.
    pub duration: Option<u32>,
    pub dynamic: Dynamic,
    /// Fallbacks applied while reading the token.
    pub warnings: Vec<WarningKind>,
}

/// Settings a grammar needs to read a token on a given track.
pub(super) struct TokenContext<'a> {
    pub config: &'a ParserConfig,
    pub time_signature: TimeSignature,
    /// Octave for chords written without one.
    pub register: i8,
}

type Matcher = fn(&RawToken) -> bool;
type Builder = fn(&RawToken, &TokenContext) -> Result<Interpreted, WarningKind>;

/// Grammars in priority order.
const GRAMMARS: &[(&str, Matcher, Builder)] = &[
    ("drum", is_drum, build_drum),
    ("chord", is_chord, build_chord),
    ("note", is_note, build_note),
    ("rest", is_rest, build_rest),
];

/// Reads a token with the first grammar that claims it.
///
/// `Err` carries the warning to raise when no grammar claims the token or
/// the claiming grammar can't make anything of it.
pub(super) fn interpret(token: &RawToken, ctx: &TokenContext) -> Result<Interpreted, WarningKind> {
    let (name, _, build) = GRAMMARS
        .iter()
        .find(|(_, matches, _)| matches(token))
        .ok_or_else(|| WarningKind::UnrecognizedToken {
            token: token.text.to_string(),
        })?;
    tracing::trace!("{:?} read as {}", token.text, name);
    build(token, ctx)
}

fn is_drum(token: &RawToken) -> bool {
    token.args.is_some() && drum_key(token.head).is_some()
}

fn build_drum(token: &RawToken, ctx: &TokenContext) -> Result<Interpreted, WarningKind> {
    let key = drum_key(token.head).ok_or_else(|| WarningKind::UnrecognizedToken {
        token: token.text.to_string(),
    })?;
    let beat = ctx.time_signature.beat_divisions();
    let bar = ctx.time_signature.bar_divisions();
    let mut warnings = Vec::new();
    let mut offsets = Vec::new();
    let mut every = None;
    let mut dynamic = None;

    for arg in token.arguments() {
        let lower = arg.to_lowercase();
        let word = lower.strip_prefix("every").map_or(lower.as_str(), str::trim);
        if let Ok(number) = word.parse::<f64>() {
            let offset = (number - 1.0) * beat as f64;
            if number.is_finite() && offset > -BEAT_EPSILON && offset.round() < bar as f64 {
                offsets.push(offset.round() as u32);
            } else {
                warnings.push(WarningKind::BeatOutsideBar {
                    token: token.text.to_string(),
                    beat: arg.to_string(),
                });
            }
        } else if let Some(value) = subdivision(word) {
            every = Some(value);
        } else if let Some(d) = Dynamic::parse(word) {
            dynamic = Some(d);
        } else {
            warnings.push(WarningKind::UnknownArgument {
                token: token.text.to_string(),
                argument: arg.to_string(),
            });
        }
    }

    offsets.sort_unstable();
    offsets.dedup();
    let (pattern, accent) = match every {
        _ if !offsets.is_empty() => (DrumPattern::Beats(offsets), Dynamic::F),
        Some(NoteValue::Sixteenth) => (DrumPattern::Every(NoteValue::Sixteenth), Dynamic::Mp),
        Some(value) => (DrumPattern::Every(value), Dynamic::Mf),
        None => {
            return Err(WarningKind::EmptyDrumPattern {
                token: token.text.to_string(),
            })
        }
    };

    Ok(Interpreted {
        kind: EventKind::Drum(DrumHit {
            instrument: canonical_drum_name(token.head),
            key,
            pattern,
        }),
        duration: None,
        dynamic: dynamic.unwrap_or(accent),
        warnings,
    })
}

/// Subdivision words of the drum grammar.
fn subdivision(word: &str) -> Option<NoteValue> {
    let value = match word {
        "8ths" | "8th" | "eighths" | "eighth" | "e" => NoteValue::Eighth,
        "16ths" | "16th" | "sixteenths" | "sixteenth" | "s" => NoteValue::Sixteenth,
        "4ths" | "4th" | "quarters" | "quarter" | "q" | "all" => NoteValue::Quarter,
        "triplets" | "t" => NoteValue::EighthTriplet,
        _ => return None,
    };
    Some(value)
}

/// `C4`, `F#3`, `Bb-1`: a pitch name followed by exactly one octave digit.
fn note_parts(head: &str) -> Option<(PitchName, i8)> {
    let (pitch, rest) = PitchName::split_prefix(head)?;
    let octave = match rest.as_bytes() {
        [d] if d.is_ascii_digit() => (d - b'0') as i8,
        b"-1" => -1,
        _ => return None,
    };
    Some((pitch, octave))
}

fn is_note(token: &RawToken) -> bool {
    token.args.is_some() && note_parts(token.head).is_some()
}

fn build_note(token: &RawToken, ctx: &TokenContext) -> Result<Interpreted, WarningKind> {
    let (pitch, octave) = note_parts(token.head).ok_or_else(|| WarningKind::UnrecognizedToken {
        token: token.text.to_string(),
    })?;
    let (duration, dynamic, warnings) = melodic_arguments(token, ctx);
    Ok(Interpreted {
        duration: Some(duration.divisions()),
        kind: EventKind::Note(SingleNote {
            pitch,
            octave,
            duration,
        }),
        dynamic,
        warnings,
    })
}

/// Chords need parentheses and either a pitch-name root or an upper-case
/// first letter (an unreadable symbol such as `Xsus99` still reads as a
/// chord, with a fallback). Single notes are left to the note grammar.
fn is_chord(token: &RawToken) -> bool {
    if token.args.is_none() || is_rest(token) || note_parts(token.head).is_some() {
        return false;
    }
    PitchName::split_prefix(token.head).is_some()
        || token.head.starts_with(|c: char| c.is_ascii_uppercase())
}

fn build_chord(token: &RawToken, ctx: &TokenContext) -> Result<Interpreted, WarningKind> {
    let (duration, dynamic, mut warnings) = melodic_arguments(token, ctx);
    let (root, quality, octave) = match read_chord_symbol(token.head) {
        Some((root, quality, octave)) => (root, quality, octave.unwrap_or(ctx.register)),
        None => {
            warnings.push(WarningKind::UnknownChordQuality {
                token: token.text.to_string(),
            });
            let root = PitchName::split_prefix(token.head)
                .map(|(root, _)| root)
                .or_else(|| PitchName::new('C', 0))
                .ok_or_else(|| WarningKind::UnrecognizedToken {
                    token: token.text.to_string(),
                })?;
            (root, ChordQuality::Major, ctx.register)
        }
    };
    Ok(Interpreted {
        duration: Some(duration.divisions()),
        kind: EventKind::Chord(Chord {
            root,
            quality,
            octave,
            duration,
        }),
        dynamic,
        warnings,
    })
}

/// Reads `Am7`, `Cmaj74` (quality then octave), `F#m`. `None` when the root
/// or the quality isn't recognized.
fn read_chord_symbol(head: &str) -> Option<(PitchName, ChordQuality, Option<i8>)> {
    let (root, rest) = PitchName::split_prefix(head)?;
    if let Some(quality) = ChordQuality::from_symbol(rest) {
        return Some((root, quality, None));
    }
    let octave = rest.chars().last()?.to_digit(10)? as i8;
    let quality = ChordQuality::from_symbol(&rest[..rest.len() - 1])?;
    Some((root, quality, Some(octave)))
}

fn is_rest(token: &RawToken) -> bool {
    matches!(token.head.to_lowercase().as_str(), "_" | "r" | "rest")
}

fn build_rest(token: &RawToken, ctx: &TokenContext) -> Result<Interpreted, WarningKind> {
    if token.head == "_" && token.args.is_none() {
        return Ok(Interpreted {
            kind: EventKind::Rest(None),
            duration: None,
            dynamic: ctx.config.default_dynamic,
            warnings: Vec::new(),
        });
    }
    let (duration, dynamic, warnings) = melodic_arguments(token, ctx);
    Ok(Interpreted {
        duration: Some(duration.divisions()),
        kind: EventKind::Rest(Some(duration)),
        dynamic,
        warnings,
    })
}

/// Reads `duration[,dynamic]` in either order, falling back to the
/// configured defaults.
fn melodic_arguments(token: &RawToken, ctx: &TokenContext) -> (Duration, Dynamic, Vec<WarningKind>) {
    let mut duration = None;
    let mut dynamic = None;
    let mut warnings = Vec::new();
    for arg in token.arguments() {
        if let Some(d) = Dynamic::parse(arg) {
            dynamic = Some(d);
        } else if let Some(d) = Duration::parse(arg) {
            duration = Some(d);
        } else {
            warnings.push(WarningKind::UnknownArgument {
                token: token.text.to_string(),
                argument: arg.to_string(),
            });
        }
    }
    (
        duration.unwrap_or_else(|| ctx.config.default_duration.clone()),
        dynamic.unwrap_or(ctx.config.default_dynamic),
        warnings,
    )
}
