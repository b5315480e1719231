//! Notation text to [`Score`].
//!
//! The notation is line oriented:
//!
//! ```text
//! SONG: Night Drive
//! TEMPO: 96
//! KEY: Am
//! SECTION: Verse [4 bars]
//!   PIANO: Am(w) | F(w) | C(h) G(h) | Am(w)
//!   DRUMS: kick(1,3) snare(2,4) hat(8ths)
//! ```
//!
//! Parsing never fails on malformed content: bad values fall back to
//! defaults, unreadable lines and tokens are skipped, and every such decision
//! lands in the [`ParseReport`]. Only text with no `SONG:` or `SECTION:` line
//! at all is an error.

mod lines;
mod report;
mod tokens;

pub use report::{ParseReport, SectionSummary, SkippedLine, Warning, WarningKind};

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::score::{
    Event, EventKind, Key, Score, Section, TimeSignature, Track, MAX_TEMPO, MIN_TEMPO,
};
use lines::{LineKind, SourceLine};
use once_cell::sync::Lazy;
use regex::Regex;
use tokens::{Interpreted, TokenContext};

/// `(8 bars)`, `[4]`, `[12 measures, swung]`
static BRACKETED_BARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[(]\s*(\d+)[^\])]*[\])]").unwrap());

/// `8 bars` anywhere in a header.
static BAR_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:bars?|measures?)\b").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

const UNTITLED: &str = "Untitled";
const DEFAULT_KEY: &str = "C";

/// Parses notation with the default configuration.
///
/// ```
/// let (score, report) = tunescript::parse(
///     "SONG: Test\nTEMPO: 100\nSECTION: A [4 bars]\n  PIANO: C(w) | G(h) | Am(h)",
/// )
/// .unwrap();
/// assert_eq!(score.tempo(), 100);
/// assert_eq!(score.sections()[0].bars(), 4);
/// assert_eq!(score.sections()[0].tracks()[0].events().len(), 3);
/// assert!(report.is_clean());
/// ```
///
/// # Errors
///
/// [`Error::EmptyOrUnrecognizedInput`] when the text has no `SONG:` or
/// `SECTION:` line.
pub fn parse(text: &str) -> Result<(Score, ParseReport)> {
    Parser::default().parse(text)
}

/// Notation parser with its fallbacks and options.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

/// Song-wide values, each taken from its first line.
struct Metadata {
    title: String,
    tempo: u32,
    key: String,
    time_signature: TimeSignature,
}

/// A track being filled line by line.
struct TrackBuilder {
    name: String,
    events: Vec<Event>,
    /// Where the next melodic event starts.
    cursor: u32,
}

struct SectionBuilder {
    name: String,
    bars: u32,
    tracks: Vec<TrackBuilder>,
}

/// Where a track line sits, for warnings.
struct LineContext<'a> {
    line: usize,
    section: usize,
    track: &'a str,
}

impl LineContext<'_> {
    fn warn(&self, report: &mut ParseReport, kind: WarningKind) {
        report.warn(Some(self.line), Some(self.section), Some(self.track), kind);
    }
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses notation into a score and a report of what was recovered.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyOrUnrecognizedInput`] when the text has no `SONG:` or
    /// `SECTION:` line.
    pub fn parse(&self, text: &str) -> Result<(Score, ParseReport)> {
        let cleaned = lines::preclean(text);
        let classified: Vec<(&SourceLine, Option<LineKind<'_>>)> = cleaned
            .iter()
            .map(|line| (line, lines::classify(&line.text)))
            .collect();

        let has_structure = classified
            .iter()
            .any(|(_, kind)| matches!(kind, Some(LineKind::Title(_) | LineKind::Section(_))));
        if !has_structure {
            return Err(Error::EmptyOrUnrecognizedInput {
                lines: text.lines().count(),
            });
        }

        let mut report = ParseReport::default();
        let meta = self.read_metadata(&classified, &mut report);
        let time_signature = meta.time_signature;

        let mut sections: Vec<SectionBuilder> = Vec::new();
        for (line, kind) in &classified {
            match kind {
                None => report.skip(line.number, &line.text),
                Some(LineKind::Section(header)) => {
                    let section = self.read_section_header(header, line.number, sections.len(), &mut report);
                    tracing::debug!("Section {:?}: {} bars", section.name, section.bars);
                    sections.push(section);
                }
                Some(LineKind::Track { label, body }) => {
                    let index = sections.len().saturating_sub(1);
                    match sections.last_mut() {
                        Some(section) => {
                            let at = LineContext {
                                line: line.number,
                                section: index,
                                track: label,
                            };
                            self.read_track_line(section, body, time_signature, &at, &mut report);
                        }
                        None => report.warn(
                            Some(line.number),
                            None,
                            Some(label.as_str()),
                            WarningKind::TrackOutsideSection,
                        ),
                    }
                }
                Some(_) => {}
            }
        }

        report.sections = sections
            .iter()
            .map(|s| SectionSummary {
                name: s.name.clone(),
                bars: s.bars,
                tracks: s
                    .tracks
                    .iter()
                    .map(|t| (t.name.clone(), t.events.len()))
                    .collect(),
            })
            .collect();

        let sections = sections
            .into_iter()
            .map(|s| {
                let tracks = s
                    .tracks
                    .into_iter()
                    .map(|t| Track::new(t.name, t.events))
                    .collect();
                Section::new(s.name, s.bars, tracks)
            })
            .collect();
        let score = Score::new(meta.title, meta.tempo, meta.key, time_signature, sections);
        report.violations = score.validate();

        tracing::info!(
            "Parsed {:?}: {} section(s), {} bar(s), {} warning(s), {} skipped line(s)",
            score.title(),
            score.sections().len(),
            score.total_bars(),
            report.warnings.len(),
            report.skipped.len()
        );
        Ok((score, report))
    }

    /// Collects metadata from anywhere in the text; the first line of each
    /// kind wins.
    fn read_metadata(
        &self,
        classified: &[(&SourceLine, Option<LineKind<'_>>)],
        report: &mut ParseReport,
    ) -> Metadata {
        let mut title: Option<String> = None;
        let mut tempo: Option<u32> = None;
        let mut key: Option<String> = None;
        let mut time_signature: Option<TimeSignature> = None;

        for (line, kind) in classified {
            let at = Some(line.number);
            let duplicate = |report: &mut ParseReport, field: &str| {
                report.warn(
                    at,
                    None,
                    None,
                    WarningKind::DuplicateMetadata {
                        field: field.to_string(),
                    },
                )
            };
            match kind {
                Some(LineKind::Title(value)) => {
                    if title.is_some() {
                        duplicate(report, "SONG");
                    } else {
                        title = Some(value.trim_matches(['"', '*']).trim().to_string());
                    }
                }
                Some(LineKind::Tempo(value)) => {
                    if tempo.is_some() {
                        duplicate(report, "TEMPO");
                    } else {
                        tempo = Some(self.read_tempo(value, line.number, report));
                    }
                }
                Some(LineKind::Key(value)) => {
                    if key.is_some() {
                        duplicate(report, "KEY");
                    } else {
                        key = Some(read_key(value, line.number, report));
                    }
                }
                Some(LineKind::TimeSignature(value)) => {
                    if time_signature.is_some() {
                        duplicate(report, "TIME");
                    } else {
                        time_signature = Some(read_time_signature(value, line.number, report));
                    }
                }
                _ => {}
            }
        }

        let tempo = tempo.unwrap_or_else(|| {
            report.warn(
                None,
                None,
                None,
                WarningKind::MissingTempo {
                    fallback: self.config.fallback_tempo(),
                },
            );
            self.config.fallback_tempo()
        });

        Metadata {
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            tempo,
            key: key.unwrap_or_else(|| DEFAULT_KEY.to_string()),
            time_signature: time_signature.unwrap_or_default(),
        }
    }

    fn read_tempo(&self, value: &str, line: usize, report: &mut ParseReport) -> u32 {
        let requested = NUMBER
            .find(value)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|bpm| bpm.round().min(u32::MAX as f64) as u32);
        let Some(requested) = requested else {
            tracing::warn!("Unreadable tempo {:?}, using {}", value, self.config.fallback_tempo());
            report.warn(
                Some(line),
                None,
                None,
                WarningKind::InvalidTempo {
                    text: value.to_string(),
                    fallback: self.config.fallback_tempo(),
                },
            );
            return self.config.fallback_tempo();
        };
        let clamped = requested.clamp(MIN_TEMPO, MAX_TEMPO);
        if clamped != requested {
            tracing::warn!("Tempo {} BPM clamped to {}", requested, clamped);
            report.warn(
                Some(line),
                None,
                None,
                WarningKind::TempoClamped { requested, clamped },
            );
        }
        clamped
    }

    fn read_section_header(
        &self,
        header: &str,
        line: usize,
        index: usize,
        report: &mut ParseReport,
    ) -> SectionBuilder {
        let bracket = BRACKETED_BARS.captures(header);
        let loose = BAR_COUNT.captures(header);

        let name_end = header
            .find(['[', '('])
            .or_else(|| loose.as_ref().and_then(|c| c.get(0)).map(|m| m.start()))
            .unwrap_or(header.len());
        let name = header[..name_end]
            .trim()
            .trim_end_matches([':', '-', ',', '–', '—'])
            .trim();
        let name = if name.is_empty() {
            format!("Section {}", index + 1)
        } else {
            name.to_string()
        };

        let requested = bracket
            .as_ref()
            .or(loose.as_ref())
            .and_then(|c| c.get(1))
            // Digits only, so a failed parse means the count overflowed.
            .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
            .filter(|bars| *bars > 0);
        let max = self.config.bar_limit();
        let bars = match requested {
            None => {
                let bars = self.config.fallback_bars();
                report.warn(Some(line), Some(index), None, WarningKind::DefaultBars { bars });
                bars
            }
            Some(requested) => match u32::try_from(requested) {
                Ok(bars) if bars <= max => bars,
                _ => {
                    report.warn(
                        Some(line),
                        Some(index),
                        None,
                        WarningKind::BarsClamped { requested, max },
                    );
                    max
                }
            },
        };

        SectionBuilder {
            name,
            bars,
            tracks: Vec::new(),
        }
    }

    /// Reads one track line and adds its events to `section`, continuing a
    /// track of the same name if the section already has one.
    fn read_track_line(
        &self,
        section: &mut SectionBuilder,
        body: &str,
        time_signature: TimeSignature,
        at: &LineContext<'_>,
        report: &mut ParseReport,
    ) {
        let ctx = TokenContext {
            config: &self.config,
            time_signature,
            register: self.config.register_for(at.track),
        };

        let mut segments: Vec<Vec<(&str, Interpreted)>> = Vec::new();
        for segment in body.split('|') {
            let mut read = Vec::new();
            for token in tokens::tokenize(segment) {
                match tokens::interpret(&token, &ctx) {
                    Ok(mut interpreted) => {
                        for kind in std::mem::take(&mut interpreted.warnings) {
                            at.warn(report, kind);
                        }
                        read.push((token.text, interpreted));
                    }
                    Err(kind) => at.warn(report, kind),
                }
            }
            segments.push(read);
        }

        let all: Vec<&Interpreted> = segments.iter().flatten().map(|(_, i)| i).collect();
        if all.is_empty() {
            at.warn(report, WarningKind::EmptyTrack);
            return;
        }
        let drum_only = all.iter().any(|i| matches!(i.kind, EventKind::Drum(_)))
            && all
                .iter()
                .all(|i| matches!(i.kind, EventKind::Drum(_) | EventKind::Rest(_)));

        let existing = section.tracks.iter().position(|t| t.name == at.track);
        let start = existing.map_or(0, |i| section.tracks[i].cursor);
        let layout = Layout {
            bar: time_signature.bar_divisions(),
            bars: section.bars,
            limit: section.bars.saturating_mul(time_signature.bar_divisions()),
        };
        let (events, cursor) = if drum_only {
            (layout.drums(&segments, at, report), start)
        } else {
            layout.melodic(&segments, start, self.config.align_bars, at, report)
        };

        match existing {
            Some(i) => {
                let track = &mut section.tracks[i];
                track.events.extend(events);
                track.cursor = cursor;
            }
            None if events.is_empty() => at.warn(report, WarningKind::EmptyTrack),
            None => {
                tracing::debug!("Track {:?}: {} event(s)", at.track, events.len());
                section.tracks.push(TrackBuilder {
                    name: at.track.to_string(),
                    events,
                    cursor,
                });
            }
        }
    }
}

/// Places interpreted tokens in a section's time.
struct Layout {
    /// Bar length in divisions.
    bar: u32,
    bars: u32,
    /// Section length in divisions.
    limit: u32,
}

impl Layout {
    /// Drum-only lines: one segment plays in every bar; several segments
    /// take turns bar by bar. Segments beyond the last bar are dropped.
    fn drums(
        &self,
        segments: &[Vec<(&str, Interpreted)>],
        at: &LineContext<'_>,
        report: &mut ParseReport,
    ) -> Vec<Event> {
        let is_drum = |i: &Interpreted| matches!(i.kind, EventKind::Drum(_));
        let hits = |segment: &[(&str, Interpreted)], onset: u32, length: u32| {
            segment
                .iter()
                .filter(|(_, i)| is_drum(i))
                .map(|(_, i)| Event::new(i.kind.clone(), onset, length, i.dynamic))
                .collect::<Vec<_>>()
        };
        if let [only] = segments {
            return hits(only.as_slice(), 0, self.limit);
        }

        for (index, segment) in segments.iter().enumerate().skip(self.bars as usize) {
            let onset = self.bar.saturating_mul(index as u32);
            for (text, _) in segment.iter().filter(|(_, i)| is_drum(i)) {
                at.warn(
                    report,
                    WarningKind::EventDropped {
                        token: text.to_string(),
                        onset,
                        limit: self.limit,
                    },
                );
            }
        }
        (0..self.bars)
            .flat_map(|bar| {
                let segment = &segments[bar as usize % segments.len()];
                hits(segment.as_slice(), bar * self.bar, self.bar)
            })
            .collect()
    }

    /// Melodic lines: each event starts where the previous one ended
    /// (or, with `align_bars`, each segment starts on its own bar line).
    /// Returns the events and the cursor after the last one.
    fn melodic(
        &self,
        segments: &[Vec<(&str, Interpreted)>],
        start: u32,
        align_bars: bool,
        at: &LineContext<'_>,
        report: &mut ParseReport,
    ) -> (Vec<Event>, u32) {
        let mut events = Vec::new();
        let mut cursor = start;
        let line_start = if align_bars && self.bar > 0 {
            start.div_ceil(self.bar) * self.bar
        } else {
            start
        };

        for (index, segment) in segments.iter().enumerate() {
            if align_bars {
                cursor = line_start.saturating_add(self.bar.saturating_mul(index as u32));
            }
            for (text, read) in segment {
                match &read.kind {
                    EventKind::Drum(_) => {
                        at.warn(
                            report,
                            WarningKind::DrumInMelodicLine {
                                token: text.to_string(),
                            },
                        );
                        if let Some(length) = self.clip(text, cursor, self.bar, at, report) {
                            events.push(Event::new(read.kind.clone(), cursor, length, read.dynamic));
                        }
                    }
                    EventKind::Rest(_) => {
                        let length = read.duration.unwrap_or(self.bar);
                        if let Some(clipped) = self.clip(text, cursor, length, at, report) {
                            events.push(Event::new(read.kind.clone(), cursor, clipped, read.dynamic));
                        }
                        cursor = cursor.saturating_add(length);
                    }
                    EventKind::Chord(_) | EventKind::Note(_) => {
                        let length = read.duration.unwrap_or(self.bar);
                        let event = Event::new(read.kind.clone(), cursor, length, read.dynamic);
                        if !event.has_playable_pitch() {
                            at.warn(
                                report,
                                WarningKind::PitchOutOfRange {
                                    token: text.to_string(),
                                },
                            );
                        } else if let Some(clipped) = self.clip(text, cursor, length, at, report) {
                            events.push(Event::new(read.kind.clone(), cursor, clipped, read.dynamic));
                        }
                        cursor = cursor.saturating_add(length);
                    }
                }
            }
        }
        (events, cursor)
    }

    /// Fits an event into the section: `None` if it starts at or past the
    /// end, otherwise its possibly shortened length.
    fn clip(
        &self,
        text: &str,
        onset: u32,
        length: u32,
        at: &LineContext<'_>,
        report: &mut ParseReport,
    ) -> Option<u32> {
        if onset >= self.limit {
            at.warn(
                report,
                WarningKind::EventDropped {
                    token: text.to_string(),
                    onset,
                    limit: self.limit,
                },
            );
            return None;
        }
        let end = onset.saturating_add(length);
        if end > self.limit {
            at.warn(
                report,
                WarningKind::EventTruncated {
                    token: text.to_string(),
                    end,
                    limit: self.limit,
                },
            );
            return Some(self.limit - onset);
        }
        Some(length)
    }
}

/// Canonical key name, or the text as written when it isn't a key.
fn read_key(value: &str, line: usize, report: &mut ParseReport) -> String {
    if let Some(key) = Key::parse(value) {
        return key.to_string();
    }
    report.warn(
        Some(line),
        None,
        None,
        WarningKind::UnknownKey {
            text: value.to_string(),
        },
    );
    if value.is_empty() {
        DEFAULT_KEY.to_string()
    } else {
        value.to_string()
    }
}

fn read_time_signature(value: &str, line: usize, report: &mut ParseReport) -> TimeSignature {
    match TimeSignature::parse(value) {
        Some(ts) if ts.is_valid() => ts,
        _ => {
            tracing::warn!("Invalid time signature {:?}, using 4/4", value);
            report.warn(
                Some(line),
                None,
                None,
                WarningKind::InvalidTimeSignature {
                    text: value.to_string(),
                },
            );
            TimeSignature::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{render, EncodeOptions};
    use crate::score::{ChordQuality, Dynamic, PitchName};

    fn kinds(report: &ParseReport) -> Vec<&WarningKind> {
        report.warnings.iter().map(|w| &w.kind).collect()
    }

    fn onsets(track: &Track) -> Vec<u32> {
        track.events().iter().map(|e| e.onset()).collect()
    }

    #[test]
    fn test_basic_song() {
        let (score, report) =
            parse("SONG: Test\nTEMPO: 100\nSECTION: A [4 bars]\n  PIANO: C(w) | G(h) | Am(h)").unwrap();
        assert_eq!(score.title(), "Test");
        assert_eq!(score.tempo(), 100);
        assert_eq!(score.key(), "C");
        assert_eq!(score.sections().len(), 1);

        let section = &score.sections()[0];
        assert_eq!(section.name(), "A");
        assert_eq!(section.bars(), 4);
        let piano = section.track("PIANO").unwrap();
        assert_eq!(onsets(piano), vec![0, 192, 288]);
        let EventKind::Chord(am) = piano.events()[2].kind() else {
            panic!("expected a chord");
        };
        assert_eq!(am.root, PitchName::new('A', 0).unwrap());
        assert_eq!(am.quality, ChordQuality::Minor);
        assert_eq!(am.octave, 4);
        assert!(report.is_clean(), "{:?}", report.warnings);
        assert_eq!(
            report.sections,
            vec![SectionSummary {
                name: "A".into(),
                bars: 4,
                tracks: vec![("PIANO".into(), 3)],
            }]
        );
    }

    #[test]
    fn test_drum_line_repeats_every_bar() {
        let (score, _) =
            parse("SONG: Beat\nSECTION: Groove [4 bars]\n  DRUMS: kick(1,3) snare(2,4) hat(8ths)").unwrap();
        let drums = score.sections()[0].track("DRUMS").unwrap();
        assert!(drums.is_drum_only());
        assert_eq!(drums.events().len(), 3);

        let kick = &drums.events()[0];
        assert_eq!((kick.onset(), kick.length()), (0, 768));
        assert_eq!(kick.drum_hits(192), vec![0, 96, 192, 288, 384, 480, 576, 672]);
        assert_eq!(drums.events()[1].drum_hits(192)[..2], [48, 144]);
        assert_eq!(drums.events()[2].drum_hits(192).len(), 32);
        assert_eq!(kick.dynamic(), Dynamic::F);
    }

    #[test]
    fn test_drum_segments_cycle_per_bar() {
        let (score, _) = parse("SECTION: Fill [4 bars]\n  DRUMS: kick(1) | snare(1) hat(8ths)").unwrap();
        let drums = score.sections()[0].track("DRUMS").unwrap();
        let summary: Vec<(u32, u32, u8)> = drums
            .events()
            .iter()
            .map(|e| match e.kind() {
                EventKind::Drum(hit) => (e.onset(), e.length(), hit.key),
                _ => panic!("non-drum event"),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 192, 36),
                (192, 192, 38),
                (192, 192, 42),
                (384, 192, 36),
                (576, 192, 38),
                (576, 192, 42),
            ]
        );
    }

    #[test]
    fn test_drum_segments_past_the_last_bar_warn() {
        let (score, report) =
            parse("TEMPO: 90\nSECTION: A [2 bars]\n  DRUMS: kick(1) | snare(1) | hat(1) | crash(1)").unwrap();
        let keys: Vec<u8> = score.sections()[0]
            .track("DRUMS")
            .unwrap()
            .events()
            .iter()
            .map(|e| match e.kind() {
                EventKind::Drum(hit) => hit.key,
                _ => panic!("non-drum event"),
            })
            .collect();
        assert_eq!(keys, vec![36, 38]);
        assert_eq!(
            kinds(&report),
            vec![
                &WarningKind::EventDropped {
                    token: "hat(1)".into(),
                    onset: 384,
                    limit: 384
                },
                &WarningKind::EventDropped {
                    token: "crash(1)".into(),
                    onset: 576,
                    limit: 384
                },
            ]
        );
    }

    #[test]
    fn test_unknown_quality_warns_and_continues() {
        let (score, report) = parse("SECTION: A [1 bar]\n  PIANO: Xsus99(q) G(q) Am(h)").unwrap();
        let piano = score.sections()[0].track("PIANO").unwrap();
        assert_eq!(piano.events().len(), 3);
        let EventKind::Chord(fallback) = piano.events()[0].kind() else {
            panic!("expected a chord");
        };
        assert_eq!(fallback.quality, ChordQuality::Major);
        assert_eq!(piano.events()[0].resolved_pitches(), vec![60, 64, 67]);
        let warnings: Vec<_> = report.warnings_for_track("PIANO").collect();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0].kind, WarningKind::UnknownChordQuality { .. }));
        assert_eq!(warnings[0].line, Some(2));
        assert_eq!(warnings[0].section, Some(0));
    }

    #[test]
    fn test_tolerates_garbage_lines() {
        let text = "Sure! Here's a chill tune for you:\n\n```\nSONG: Garbage In\nTEMPO: 80\n\
                    ~~~ ??? ~~~\nSECTION: Verse [2 bars]\n  PIANO: C(w) | F(w)\n  !!!\n\
                    Note: the bass should be soft\n```\nEnjoy!";
        let (score, report) = parse(text).unwrap();
        assert_eq!(score.title(), "Garbage In");
        assert_eq!(score.sections()[0].tracks().len(), 1);
        assert!(report.skipped.iter().any(|s| s.text == "~~~ ??? ~~~"));
        assert!(report.skipped.iter().any(|s| s.text == "!!!"));
        assert!(report.skipped.iter().any(|s| s.text == "Enjoy!"));
        // "Note: ..." reads as a track line with nothing playable in it.
        assert!(report
            .warnings_for_track("NOTE")
            .any(|w| w.kind == WarningKind::EmptyTrack));
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_unrecognized_input_is_an_error() {
        assert!(matches!(
            parse(""),
            Err(Error::EmptyOrUnrecognizedInput { lines: 0 })
        ));
        assert!(matches!(
            parse("hello\nworld\nPIANO: C(w)"),
            Err(Error::EmptyOrUnrecognizedInput { lines: 3 })
        ));
    }

    #[test]
    fn test_song_without_sections_fails_validation() {
        let (score, report) = parse("SONG: Only a title").unwrap();
        assert!(score.sections().is_empty());
        assert_eq!(report.violations, vec![crate::score::Violation::NoSections]);
    }

    #[test]
    fn test_tempo_fallbacks() {
        let (score, report) = parse("SECTION: A [1 bar]\n  PIANO: C(w)").unwrap();
        assert_eq!(score.tempo(), 120);
        assert_eq!(kinds(&report), vec![&WarningKind::MissingTempo { fallback: 120 }]);

        let (score, report) = parse("TEMPO: fast\nSECTION: A [1 bar]").unwrap();
        assert_eq!(score.tempo(), 120);
        assert!(matches!(kinds(&report)[0], WarningKind::InvalidTempo { .. }));

        let (score, report) = parse("TEMPO: 1000 bpm\nTEMPO: 90\nSECTION: A [1 bar]").unwrap();
        assert_eq!(score.tempo(), 400);
        assert_eq!(
            kinds(&report)[..2],
            [
                &WarningKind::TempoClamped {
                    requested: 1000,
                    clamped: 400
                },
                &WarningKind::DuplicateMetadata {
                    field: "TEMPO".into()
                },
            ]
        );

        let (score, _) = parse("TEMPO: 92.6 BPM\nSECTION: A [1 bar]").unwrap();
        assert_eq!(score.tempo(), 93);
    }

    #[test]
    fn test_key_and_time_signature() {
        let text = "SONG: Meta\nKEY: a minor\nTEMPO: 90\nSECTION: A [2 bars]\n  PIANO: Am(dh) | E(dh)\nTIME: 3/4";
        let (score, report) = parse(text).unwrap();
        assert_eq!(score.key(), "Am");
        assert_eq!(score.time_signature(), TimeSignature::new(3, 4));
        // The time signature applies even though it comes last.
        assert_eq!(onsets(score.sections()[0].track("PIANO").unwrap()), vec![0, 144]);
        assert!(report.is_clean(), "{:?}", report.warnings);

        let (score, report) = parse("KEY: Dorian-ish\nTIME: 7/5\nTEMPO: 90\nSECTION: A [1 bar]").unwrap();
        assert_eq!(score.key(), "Dorian-ish");
        assert_eq!(score.time_signature(), TimeSignature::default());
        assert!(matches!(kinds(&report)[0], WarningKind::UnknownKey { .. }));
        assert!(matches!(kinds(&report)[1], WarningKind::InvalidTimeSignature { .. }));
    }

    #[test]
    fn test_section_headers() {
        let text = "TEMPO: 90\nSECTION: Intro (2)\nSECTION: Verse - 4 bars\nSECTION: Chorus [16 measures, big]\n\
                    SECTION: Bridge\nSECTION: Outro [0 bars]\nSECTION: Jam [9999 bars]\nSECTION: [2 bars]";
        let (score, report) = parse(text).unwrap();
        let shapes: Vec<(&str, u32)> = score.sections().iter().map(|s| (s.name(), s.bars())).collect();
        assert_eq!(
            shapes,
            vec![
                ("Intro", 2),
                ("Verse", 4),
                ("Chorus", 16),
                ("Bridge", 8),
                ("Outro", 8),
                ("Jam", 512),
                ("Section 7", 2),
            ]
        );
        assert_eq!(
            kinds(&report),
            vec![
                &WarningKind::DefaultBars { bars: 8 },
                &WarningKind::DefaultBars { bars: 8 },
                &WarningKind::BarsClamped {
                    requested: 9999,
                    max: 512
                },
            ]
        );
    }

    #[test]
    fn test_huge_bar_counts_are_clamped() {
        let (score, report) = parse(
            "TEMPO: 90\nSECTION: Forever [99999999999 bars]\nSECTION: Longer [999999999999999999999999 bars]",
        )
        .unwrap();
        let bars: Vec<u32> = score.sections().iter().map(|s| s.bars()).collect();
        assert_eq!(bars, vec![512, 512]);
        assert_eq!(
            kinds(&report),
            vec![
                &WarningKind::BarsClamped {
                    requested: 99_999_999_999,
                    max: 512
                },
                &WarningKind::BarsClamped {
                    requested: u64::MAX,
                    max: 512
                },
            ]
        );
    }

    #[test]
    fn test_duplicates() {
        let text = "TEMPO: 90\nSECTION: Verse [2 bars]\n  LEAD: C5(h) D5(h)\n  LEAD: E5(w)\n\
                    SECTION: Verse [1 bar]\n  LEAD: G5(w)";
        let (score, report) = parse(text).unwrap();
        assert_eq!(score.sections().len(), 2);
        assert_eq!(score.sections()[0].tracks().len(), 1);
        assert_eq!(onsets(score.sections()[0].track("LEAD").unwrap()), vec![0, 96, 192]);
        assert_eq!(score.sections()[1].name(), "Verse");
        assert!(report.is_clean(), "{:?}", report.warnings);
    }

    #[test]
    fn test_clipping_at_section_end() {
        let (score, report) = parse("TEMPO: 90\nSECTION: A [1 bar]\n  PIANO: C(w) D(w)\n  LEAD: C5(h~w)").unwrap();
        let section = &score.sections()[0];
        assert_eq!(section.track("PIANO").unwrap().events().len(), 1);
        let lead = &section.track("LEAD").unwrap().events()[0];
        assert_eq!((lead.onset(), lead.length()), (0, 192));
        assert_eq!(
            kinds(&report),
            vec![
                &WarningKind::EventDropped {
                    token: "D(w)".into(),
                    onset: 192,
                    limit: 192
                },
                &WarningKind::EventTruncated {
                    token: "C5(h~w)".into(),
                    end: 288,
                    limit: 192
                },
            ]
        );
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_align_bars() {
        let text = "TEMPO: 90\nSECTION: A [2 bars]\n  PIANO: C(h) | G(h)";
        let (score, _) = parse(text).unwrap();
        assert_eq!(onsets(score.sections()[0].track("PIANO").unwrap()), vec![0, 96]);

        let parser = Parser::new(ParserConfig {
            align_bars: true,
            ..ParserConfig::default()
        });
        let (score, _) = parser.parse(text).unwrap();
        assert_eq!(onsets(score.sections()[0].track("PIANO").unwrap()), vec![0, 192]);
    }

    #[test]
    fn test_rests_advance_time() {
        let (score, _) = parse("TEMPO: 90\nSECTION: A [3 bars]\n  LEAD: _ | r(h) C5(h) | E5(q)").unwrap();
        let lead = score.sections()[0].track("LEAD").unwrap();
        assert_eq!(onsets(lead), vec![0, 192, 288, 384]);
        assert!(lead.events()[0].is_rest());
        assert_eq!(lead.events()[0].length(), 192);
    }

    #[test]
    fn test_rests_past_section_end_warn() {
        let (score, report) = parse("TEMPO: 90\nSECTION: A [1 bar]\n  LEAD: C5(h) r(w) _").unwrap();
        let lead = score.sections()[0].track("LEAD").unwrap();
        assert_eq!(onsets(lead), vec![0, 96]);
        assert_eq!(lead.events()[1].length(), 96);
        assert_eq!(
            kinds(&report),
            vec![
                &WarningKind::EventTruncated {
                    token: "r(w)".into(),
                    end: 288,
                    limit: 192
                },
                &WarningKind::EventDropped {
                    token: "_".into(),
                    onset: 288,
                    limit: 192
                },
            ]
        );
    }

    #[test]
    fn test_registers_and_out_of_range_pitches() {
        let (score, report) =
            parse("TEMPO: 90\nSECTION: A [1 bar]\n  BASS: C(h) B9(h)\n  LEAD: Am(w)").unwrap();
        let section = &score.sections()[0];
        let bass = section.track("BASS").unwrap();
        assert_eq!(bass.events().len(), 1);
        assert_eq!(bass.events()[0].resolved_pitches(), vec![36, 40, 43]);
        assert_eq!(section.track("LEAD").unwrap().events()[0].resolved_pitches(), vec![81, 84, 88]);
        assert!(report
            .warnings_for_track("BASS")
            .any(|w| matches!(w.kind, WarningKind::PitchOutOfRange { .. })));
    }

    #[test]
    fn test_track_line_problems() {
        let text = "TEMPO: 90\nPIANO: C(w)\nSECTION: A [1 bar]\n  STRINGS: la la la\n  PIANO: C(h) kick(1) G(h)";
        let (score, report) = parse(text).unwrap();
        let section = &score.sections()[0];
        assert!(section.track("STRINGS").is_none());
        let piano = section.track("PIANO").unwrap();
        assert_eq!(onsets(piano), vec![0, 96, 96]);
        assert!(matches!(report.warnings[0].kind, WarningKind::TrackOutsideSection));
        assert_eq!(report.warnings[0].section, None);
        assert!(report
            .warnings_for_track("STRINGS")
            .any(|w| w.kind == WarningKind::EmptyTrack));
        assert!(report
            .warnings_for_track("PIANO")
            .any(|w| matches!(w.kind, WarningKind::DrumInMelodicLine { .. })));
    }

    #[test]
    fn test_single_line_input() {
        let (score, _) = parse(
            "SONG: Folded TEMPO: 110 KEY: G SECTION: A [2 bars] PIANO: G(w) | D(w) BASS: G2(w) | D2(w) SECTION: B [1 bar] PIANO: C(w)",
        )
        .unwrap();
        assert_eq!(score.title(), "Folded");
        assert_eq!(score.tempo(), 110);
        assert_eq!(score.key(), "G");
        assert_eq!(score.sections().len(), 2);
        assert_eq!(score.sections()[0].tracks().len(), 2);
        assert_eq!(score.sections()[1].event_count(), 1);
    }

    #[test]
    fn test_louder_dynamics_never_get_quieter_velocities() {
        let (score, _) = parse(
            "TEMPO: 90\nSECTION: A [2 bars]\n  LEAD: C5(e,ppp) C5(e,pp) C5(e,p) C5(e,mp) C5(e,mf) C5(e,f) C5(e,ff) C5(e,fff)",
        )
        .unwrap();
        let song = render(&score, &EncodeOptions::default()).unwrap();
        let velocities: Vec<u8> = song.tracks[0].notes.iter().map(|n| n.velocity).collect();
        assert_eq!(velocities.len(), 8);
        assert!(velocities.windows(2).all(|w| w[0] < w[1]), "{:?}", velocities);
    }

    #[test]
    fn test_custom_defaults() {
        let parser = Parser::new(ParserConfig {
            default_tempo: 72,
            default_bars: 2,
            default_dynamic: Dynamic::P,
            ..ParserConfig::default()
        });
        let (score, _) = parser.parse("SECTION: Soft\n  PIANO: C(h)").unwrap();
        assert_eq!(score.tempo(), 72);
        assert_eq!(score.sections()[0].bars(), 2);
        assert_eq!(score.sections()[0].tracks()[0].events()[0].dynamic(), Dynamic::P);
        assert_eq!(parser.config().default_bars, 2);
    }

    #[test]
    fn test_out_of_range_defaults_still_give_a_valid_score() {
        let parser = Parser::new(ParserConfig {
            default_tempo: 0,
            default_bars: 0,
            max_bars: 0,
            ..ParserConfig::default()
        });
        let (score, report) = parser.parse("SECTION: A\n  PIANO: C(w)").unwrap();
        assert_eq!(score.tempo(), MIN_TEMPO);
        assert_eq!(score.sections()[0].bars(), 1);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::MissingTempo { fallback: MIN_TEMPO }));
    }
}
