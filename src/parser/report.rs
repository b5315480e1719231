//! What the parser recovered from, skipped and produced.

use crate::score::Violation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable problem and the fallback that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A metadata line repeated; the first value was kept.
    DuplicateMetadata { field: String },
    /// No tempo line; the default was used.
    MissingTempo { fallback: u32 },
    /// Tempo unreadable; the default was used.
    InvalidTempo { text: String, fallback: u32 },
    TempoClamped { requested: u32, clamped: u32 },
    /// Key name not recognized; kept as written.
    UnknownKey { text: String },
    /// Time signature unreadable or unsupported; 4/4 was used.
    InvalidTimeSignature { text: String },
    /// Section header without a usable bar count.
    DefaultBars { bars: u32 },
    BarsClamped { requested: u64, max: u32 },
    /// Track line before the first `SECTION:`.
    TrackOutsideSection,
    /// Track line with no recognizable event.
    EmptyTrack,
    UnrecognizedToken { token: String },
    /// Chord quality not understood; played as a major triad.
    UnknownChordQuality { token: String },
    UnknownArgument { token: String, argument: String },
    /// Drum token in a pitched line; placed without advancing time.
    DrumInMelodicLine { token: String },
    /// Drum token whose arguments give no hit position.
    EmptyDrumPattern { token: String },
    /// A drum beat before beat 1 or past the end of the bar.
    BeatOutsideBar { token: String, beat: String },
    /// An event running past the section end was cut short.
    EventTruncated { token: String, end: u32, limit: u32 },
    /// An event starting at or after the section end was dropped.
    EventDropped { token: String, onset: u32, limit: u32 },
    /// Every pitch of the event is outside 0-127; it was dropped.
    PitchOutOfRange { token: String },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::DuplicateMetadata { field } => {
                write!(f, "duplicate {} line ignored", field)
            }
            WarningKind::MissingTempo { fallback } => write!(f, "no tempo given, using {} BPM", fallback),
            WarningKind::InvalidTempo { text, fallback } => {
                write!(f, "unreadable tempo {:?}, using {} BPM", text, fallback)
            }
            WarningKind::TempoClamped { requested, clamped } => {
                write!(f, "tempo {} BPM clamped to {}", requested, clamped)
            }
            WarningKind::UnknownKey { text } => write!(f, "unrecognized key {:?} kept as written", text),
            WarningKind::InvalidTimeSignature { text } => {
                write!(f, "invalid time signature {:?}, using 4/4", text)
            }
            WarningKind::DefaultBars { bars } => {
                write!(f, "no bar count in section header, using {}", bars)
            }
            WarningKind::BarsClamped { requested, max } => {
                write!(f, "{} bars clamped to {}", requested, max)
            }
            WarningKind::TrackOutsideSection => write!(f, "track line before any SECTION: skipped"),
            WarningKind::EmptyTrack => write!(f, "no recognizable events, line skipped"),
            WarningKind::UnrecognizedToken { token } => write!(f, "unrecognized token {:?}", token),
            WarningKind::UnknownChordQuality { token } => {
                write!(f, "unknown chord {:?}, playing a major triad", token)
            }
            WarningKind::UnknownArgument { token, argument } => {
                write!(f, "unknown argument {:?} in {:?}", argument, token)
            }
            WarningKind::DrumInMelodicLine { token } => {
                write!(f, "drum {:?} in a pitched line", token)
            }
            WarningKind::EmptyDrumPattern { token } => write!(f, "drum {:?} has no hits", token),
            WarningKind::BeatOutsideBar { token, beat } => {
                write!(f, "beat {} of {:?} is outside the bar", beat, token)
            }
            WarningKind::EventTruncated { token, end, limit } => write!(
                f,
                "{:?} runs to division {}, cut at the section end ({})",
                token, end, limit
            ),
            WarningKind::EventDropped { token, onset, limit } => write!(
                f,
                "{:?} starts at division {}, past the section end ({}); dropped",
                token, onset, limit
            ),
            WarningKind::PitchOutOfRange { token } => {
                write!(f, "{:?} has no pitch in the MIDI range; dropped", token)
            }
        }
    }
}

/// A warning with the place it was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// 1-based line number.
    pub line: Option<usize>,
    /// Index into the score's sections.
    pub section: Option<usize>,
    pub track: Option<String>,
    pub kind: WarningKind,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        if let Some(track) = &self.track {
            write!(f, "[{}] ", track)?;
        }
        write!(f, "{}", self.kind)
    }
}

/// A line that was not part of the notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line: usize,
    pub text: String,
}

/// Shape of one parsed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub name: String,
    pub bars: u32,
    /// Track names and their event counts, in section order.
    pub tracks: Vec<(String, usize)>,
}

/// Everything the parser has to say about one input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub warnings: Vec<Warning>,
    pub skipped: Vec<SkippedLine>,
    pub sections: Vec<SectionSummary>,
    /// Result of validating the produced score; empty when it can be encoded.
    pub violations: Vec<Violation>,
}

impl ParseReport {
    /// Warnings raised on one track, in the order they were raised.
    pub fn warnings_for_track<'a>(&'a self, track: &'a str) -> impl Iterator<Item = &'a Warning> {
        self.warnings
            .iter()
            .filter(move |w| w.track.as_deref() == Some(track))
    }

    /// True when nothing needed a fallback and the score is valid.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.violations.is_empty()
    }

    pub(super) fn warn(
        &mut self,
        line: Option<usize>,
        section: Option<usize>,
        track: Option<&str>,
        kind: WarningKind,
    ) {
        let warning = Warning {
            line,
            section,
            track: track.map(str::to_string),
            kind,
        };
        tracing::debug!("{}", warning);
        self.warnings.push(warning);
    }

    pub(super) fn skip(&mut self, line: usize, text: &str) {
        self.skipped.push(SkippedLine {
            line,
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = Warning {
            line: Some(4),
            section: Some(0),
            track: Some("PIANO".into()),
            kind: WarningKind::UnrecognizedToken { token: "C!".into() },
        };
        assert_eq!(warning.to_string(), "line 4: [PIANO] unrecognized token \"C!\"");
    }

    #[test]
    fn test_warnings_for_track() {
        let mut report = ParseReport::default();
        report.warn(Some(1), None, None, WarningKind::TrackOutsideSection);
        report.warn(Some(3), Some(0), Some("BASS"), WarningKind::EmptyTrack);
        report.warn(
            Some(4),
            Some(0),
            Some("LEAD"),
            WarningKind::UnrecognizedToken { token: "x".into() },
        );
        assert_eq!(report.warnings_for_track("BASS").count(), 1);
        assert_eq!(report.warnings_for_track("DRUMS").count(), 0);
        assert!(!report.is_clean());
        assert!(ParseReport::default().is_clean());
    }
}
