//! Standard MIDI File (SMF) decoding.
//!
//! Reads SMF bytes back into tick-based note lists. This is the inverse of
//! the encoder for the subset it writes and is used to check encoder output.
//!
//! # Limitations
//!
//! - Only note on/off events become notes
//! - Tempo, time signature, markers and the song title come from the first
//!   track of a Format 1 file (or the only track of a Format 0 file)
//! - Program changes set the track's program; the first channel used is
//!   reported as the track's channel
//! - Other MIDI events (controllers, pitch bend, SysEx) are ignored

use super::Note;
use crate::error::{Error, Result};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};

/// One decoded track chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTrack {
    pub name: Option<String>,
    pub channel: Option<u8>,
    pub program: Option<u8>,
    /// Notes sorted by start tick, then pitch.
    pub notes: Vec<Note>,
}

/// A decoded Standard MIDI File.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSong {
    pub ticks_per_quarter: u16,
    pub title: Option<String>,
    /// Tempo in whole beats per minute.
    pub tempo: Option<u32>,
    /// Numerator and denominator (not its power of two).
    pub time_signature: Option<(u8, u8)>,
    pub markers: Vec<(u32, String)>,
    /// Music tracks (every track after the first in a Format 1 file).
    pub tracks: Vec<DecodedTrack>,
}

impl DecodedSong {
    /// Finds a track by its name.
    pub fn track(&self, name: &str) -> Option<&DecodedTrack> {
        self.tracks.iter().find(|t| t.name.as_deref() == Some(name))
    }
}

/// Active notes keyed by (channel, pitch): start tick and velocity, oldest
/// first, so overlapping strikes of one key release in order.
type ActiveNotes = HashMap<(u8, u8), VecDeque<(u32, u8)>>;

/// Decodes SMF bytes.
///
/// # Errors
///
/// [`Error::Decode`] if the bytes are not a valid SMF, use SMPTE timing, or
/// are a Format 2 (sequential) file.
pub fn decode(bytes: &[u8]) -> Result<DecodedSong> {
    let smf = Smf::parse(bytes).map_err(|e| Error::Decode(e.to_string()))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(_, _) => {
            return Err(Error::Decode(
                "SMPTE timecode timing not supported".to_string(),
            ))
        }
    };

    let mut song = DecodedSong {
        ticks_per_quarter,
        ..DecodedSong::default()
    };

    match smf.header.format {
        Format::SingleTrack => {
            if let Some(track) = smf.tracks.first() {
                let decoded = decode_track(track, &mut song);
                song.tracks.push(decoded);
            }
        }
        Format::Parallel => {
            for (index, track) in smf.tracks.iter().enumerate() {
                let decoded = decode_track(track, &mut song);
                if index == 0 {
                    song.title = decoded.name;
                } else {
                    song.tracks.push(decoded);
                }
            }
        }
        Format::Sequential => {
            return Err(Error::Decode(
                "Format 2 (sequential) MIDI files not supported".to_string(),
            ))
        }
    }

    Ok(song)
}

/// Decodes one track, recording song-wide meta events into `song`.
fn decode_track(track: &[TrackEvent], song: &mut DecodedSong) -> DecodedTrack {
    let mut decoded = DecodedTrack::default();
    let mut active: ActiveNotes = HashMap::new();
    let mut current_tick: u32 = 0;

    for event in track {
        current_tick = current_tick.saturating_add(event.delta.as_int());

        match event.kind {
            TrackEventKind::Meta(meta) => match meta {
                MetaMessage::TrackName(name) => {
                    decoded.name = Some(String::from_utf8_lossy(name).into_owned());
                }
                MetaMessage::Marker(text) => {
                    song.markers
                        .push((current_tick, String::from_utf8_lossy(text).into_owned()));
                }
                MetaMessage::Tempo(usec) => {
                    let usec_per_beat = usec.as_int();
                    if usec_per_beat > 0 {
                        song.tempo = Some(60_000_000 / usec_per_beat);
                    }
                }
                MetaMessage::TimeSignature(num, denom_power, _, _) => {
                    song.time_signature = Some((num, 1u8 << denom_power.min(7)));
                }
                _ => {}
            },
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                decoded.channel.get_or_insert(ch);

                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        active
                            .entry((ch, key.as_int()))
                            .or_default()
                            .push_back((current_tick, vel.as_int()));
                    }
                    // Note on with velocity 0 = note off
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        if let Some((start, velocity)) =
                            active.get_mut(&(ch, pitch)).and_then(|q| q.pop_front())
                        {
                            decoded.notes.push(Note::new(
                                pitch,
                                velocity,
                                start,
                                current_tick.saturating_sub(start),
                            ));
                        }
                    }
                    MidiMessage::ProgramChange { program } => {
                        decoded.program = Some(program.as_int());
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // Close notes left hanging at the end of the track.
    for ((_, pitch), queue) in active {
        for (start, velocity) in queue {
            decoded.notes.push(Note::new(
                pitch,
                velocity,
                start,
                current_tick.saturating_sub(start),
            ));
        }
    }

    decoded.notes.sort();
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{encode, render, EncodeOptions};
    use crate::parse;

    const SONG: &str = "SONG: Round Trip
TEMPO: 96
TIME: 3/4
KEY: Eb

SECTION: Intro [2 bars]
  PIANO: Eb(dh,p) | Cm(h) Bb(q,f)
  BASS: Eb2(dh) | C2(h) Bb1(q)

SECTION: Verse [2 bars]
  PIANO: Ab(dh) | Bb7sus(dh)
  STRINGS: Eb5(q,pp) G5(q,mp) Bb5(q,mf) | Eb6(dh,ff)
  DRUMS: kick(1) snare(2,3) hat(8ths)
";

    #[test]
    fn test_round_trip_preserves_notes() {
        let (score, _) = parse(SONG).unwrap();
        let options = EncodeOptions::default();
        let rendered = render(&score, &options).unwrap();
        let decoded = decode(&encode(&score, &options).unwrap()).unwrap();

        assert_eq!(decoded.ticks_per_quarter, 480);
        assert_eq!(decoded.tracks.len(), rendered.tracks.len());
        for expected in &rendered.tracks {
            let track = decoded.track(&expected.assignment.track).unwrap();
            let mut notes = expected.notes.clone();
            notes.sort();
            assert_eq!(track.notes, notes, "track {}", expected.assignment.track);
            assert_eq!(track.channel, Some(expected.assignment.channel));
            assert_eq!(track.program, Some(expected.assignment.program));
        }
    }

    #[test]
    fn test_round_trip_with_running_status() {
        let (score, _) = parse(SONG).unwrap();
        let options = EncodeOptions {
            running_status: true,
            ..EncodeOptions::default()
        };
        let rendered = render(&score, &options).unwrap();
        let decoded = decode(&encode(&score, &options).unwrap()).unwrap();
        for expected in &rendered.tracks {
            let mut notes = expected.notes.clone();
            notes.sort();
            assert_eq!(decoded.track(&expected.assignment.track).unwrap().notes, notes);
        }
    }

    #[test]
    fn test_meta_track_decodes() {
        let (score, _) = parse(SONG).unwrap();
        let decoded = decode(&encode(&score, &EncodeOptions::default()).unwrap()).unwrap();
        assert_eq!(decoded.title.as_deref(), Some("Round Trip"));
        assert_eq!(decoded.tempo, Some(96));
        assert_eq!(decoded.time_signature, Some((3, 4)));
        assert_eq!(
            decoded.markers,
            vec![(0, "Intro".to_string()), (2880, "Verse".to_string())]
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode(b"not a midi file"), Err(Error::Decode(_))));
    }
}
