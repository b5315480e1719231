//! Structural invariants of a [`Score`].

use super::{Score, MAX_TEMPO, MIN_TEMPO};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// One broken invariant, with enough context to point at the culprit.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Violation {
    #[error("tempo {0} BPM is outside 20..=400")]
    TempoOutOfRange(u32),

    #[error("time signature {numerator}/{denominator} is not valid")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("score has no sections")]
    NoSections,

    #[error("section {section} ({name:?}) has zero bars")]
    EmptySection { section: usize, name: String },

    #[error("section {section} ({name:?}) has more than one track named {track:?}")]
    DuplicateTrack {
        section: usize,
        name: String,
        track: String,
    },

    #[error("track {track:?} in section {section} runs to division {end}, past the section end at {limit}")]
    TrackOverflow {
        section: usize,
        track: String,
        end: u32,
        limit: u32,
    },

    #[error("event {event} of track {track:?} in section {section} has no pitch in the MIDI range")]
    UnresolvablePitch {
        section: usize,
        track: String,
        event: usize,
    },
}

/// Collects every violation in `score`, in document order.
pub(super) fn validate(score: &Score) -> Vec<Violation> {
    let mut violations = Vec::new();

    if !(MIN_TEMPO..=MAX_TEMPO).contains(&score.tempo()) {
        violations.push(Violation::TempoOutOfRange(score.tempo()));
    }
    let ts = score.time_signature();
    let time_signature_ok = ts.is_valid();
    if !time_signature_ok {
        violations.push(Violation::InvalidTimeSignature {
            numerator: ts.numerator,
            denominator: ts.denominator,
        });
    }
    if score.sections().is_empty() {
        violations.push(Violation::NoSections);
    }

    for (index, section) in score.sections().iter().enumerate() {
        if section.bars() == 0 {
            violations.push(Violation::EmptySection {
                section: index,
                name: section.name().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for track in section.tracks() {
            if !seen.insert(track.name()) {
                violations.push(Violation::DuplicateTrack {
                    section: index,
                    name: section.name().to_string(),
                    track: track.name().to_string(),
                });
            }
        }

        // Without a usable bar length there is nothing to measure against.
        let limit = time_signature_ok.then(|| section.length_divisions(ts));
        for track in section.tracks() {
            if let Some(limit) = limit {
                let end = track.events().iter().map(|e| e.end()).max().unwrap_or(0);
                if end > limit {
                    violations.push(Violation::TrackOverflow {
                        section: index,
                        track: track.name().to_string(),
                        end,
                        limit,
                    });
                }
            }
            for (event_index, event) in track.events().iter().enumerate() {
                if !event.is_rest() && !event.has_playable_pitch() {
                    violations.push(Violation::UnresolvablePitch {
                        section: index,
                        track: track.name().to_string(),
                        event: event_index,
                    });
                }
            }
        }
    }

    violations
}
