//! Standard MIDI File (SMF) encoding.
//!
//! Lowers a [`Score`] into per-track note lists ([`render`]) and serializes
//! them as an SMF Format 1 byte stream ([`encode`]):
//! - Track 0: title, time signature, key signature, tempo and one marker
//!   per section
//! - Tracks 1-N: one per logical instrument, with program change, volume,
//!   pan and note data
//!
//! Output is a pure function of the score and options, so encoding the same
//! input twice gives identical bytes.

use super::instruments::{ChannelAllocator, InstrumentAssignment, InstrumentMap};
use super::{ticks_to_seconds, Note, VelocityTable, MAX_TICK, TICKS_PER_BEAT};
use crate::error::{Error, Result};
use crate::score::{divisions_to_ticks, EventKind, Score, DRUM_HIT_DIVISIONS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Channel volume (CC 7) written for every instrument track.
const TRACK_VOLUME: u8 = 100;

/// Centered pan (CC 10).
const TRACK_PAN: u8 = 64;

/// Encoder settings. Every field has a default, so a partial JSON object
/// (or none at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Resolution in ticks per quarter note (1..=0x7FFF).
    pub ticks_per_quarter: u16,
    /// Replacement for the built-in General MIDI keyword table.
    pub instruments: Option<InstrumentMap>,
    /// Dynamic → velocity table.
    pub velocities: VelocityTable,
    /// Omit repeated channel status bytes (SMF running status).
    pub running_status: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            ticks_per_quarter: TICKS_PER_BEAT,
            instruments: None,
            velocities: VelocityTable::default(),
            running_status: false,
        }
    }
}

impl EncodeOptions {
    /// The instrument table in effect.
    pub fn instrument_map(&self) -> &InstrumentMap {
        self.instruments
            .as_ref()
            .unwrap_or_else(|| InstrumentMap::general_midi())
    }
}

/// A recoverable problem found while encoding one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderWarning {
    pub track: String,
    pub message: String,
}

/// One logical track lowered to MIDI notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTrack {
    pub assignment: InstrumentAssignment,
    /// Notes in the order they were produced (section, event, chord tone).
    pub notes: Vec<Note>,
}

/// A score lowered to ticks, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSong {
    pub ticks_per_quarter: u16,
    /// Tick at which every track ends.
    pub end_tick: u32,
    /// Section start ticks and names.
    pub markers: Vec<(u32, String)>,
    pub tracks: Vec<RenderedTrack>,
    pub warnings: Vec<EncoderWarning>,
}

/// Encoder output for collaborators that need more than the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub assignments: Vec<InstrumentAssignment>,
    pub warnings: Vec<EncoderWarning>,
}

impl Encoded {
    /// Warnings raised for one track.
    pub fn warnings_for(&self, track: &str) -> impl Iterator<Item = &EncoderWarning> {
        let track = track.to_string();
        self.warnings.iter().filter(move |w| w.track == track)
    }
}

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow (1 = more bytes, 0 = last byte). SMF allows
/// at most four bytes, so values above [`MAX_TICK`] are clamped.
fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    let value = value.min(MAX_TICK);
    if value == 0 {
        buffer.push(0);
        return;
    }

    let mut temp = value;
    let mut bytes = Vec::with_capacity(4);

    while temp > 0 {
        bytes.push((temp & 0x7F) as u8);
        temp >>= 7;
    }

    // Write bytes in reverse order with continuation bits
    for (i, &byte) in bytes.iter().rev().enumerate() {
        if i < bytes.len() - 1 {
            buffer.push(byte | 0x80);
        } else {
            buffer.push(byte);
        }
    }
}

/// MIDI event types for track data.
enum MidiEvent {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Set tempo: microseconds per quarter note
    SetTempo {
        microseconds_per_beat: u32,
    },
    TimeSignature {
        numerator: u8,
        denominator_power: u8,
    },
    /// Sharps (positive) or flats (negative), and whether the key is minor
    KeySignature {
        sharps: i8,
        minor: bool,
    },
    TrackName {
        name: String,
    },
    Marker {
        text: String,
    },
    EndOfTrack,
}

impl MidiEvent {
    /// Status byte for channel messages; `None` for meta events.
    fn channel_status(&self) -> Option<u8> {
        match self {
            MidiEvent::NoteOn { channel, .. } => Some(0x90 | (channel & 0x0F)),
            MidiEvent::NoteOff { channel, .. } => Some(0x80 | (channel & 0x0F)),
            MidiEvent::ProgramChange { channel, .. } => Some(0xC0 | (channel & 0x0F)),
            MidiEvent::ControlChange { channel, .. } => Some(0xB0 | (channel & 0x0F)),
            _ => None,
        }
    }
}

/// Represents a timed MIDI event for sorting and writing.
struct TimedEvent {
    /// Absolute tick position
    tick: u32,
    event: MidiEvent,
    /// Order among events at the same tick (lower = first). Set-up events
    /// come first, then note-offs, then note-ons, so a repeated pitch is
    /// released before it is struck again.
    priority: u8,
}

impl TimedEvent {
    fn new(tick: u32, event: MidiEvent, priority: u8) -> Self {
        Self {
            tick,
            event,
            priority,
        }
    }
}

const PRIORITY_NOTE_OFF: u8 = 10;
const PRIORITY_NOTE_ON: u8 = 11;
const PRIORITY_END: u8 = 255;

fn write_meta(kind: u8, data: &[u8], buffer: &mut Vec<u8>) {
    buffer.push(0xFF);
    buffer.push(kind);
    write_vlq(data.len() as u32, buffer);
    buffer.extend_from_slice(data);
}

/// Writes a single MIDI event to the buffer (without delta time).
///
/// With running status enabled, the status byte of a channel message is
/// left out when it repeats the previous one; meta events cancel running
/// status.
fn write_event(event: &MidiEvent, running: Option<u8>, buffer: &mut Vec<u8>) {
    if let Some(status) = event.channel_status() {
        if running != Some(status) {
            buffer.push(status);
        }
    }
    match event {
        MidiEvent::NoteOn {
            pitch, velocity, ..
        } => {
            buffer.push(*pitch);
            buffer.push(*velocity);
        }
        MidiEvent::NoteOff { pitch, .. } => {
            buffer.push(*pitch);
            buffer.push(0);
        }
        MidiEvent::ProgramChange { program, .. } => {
            buffer.push(*program);
        }
        MidiEvent::ControlChange {
            controller, value, ..
        } => {
            buffer.push(*controller);
            buffer.push(*value);
        }
        MidiEvent::SetTempo {
            microseconds_per_beat,
        } => {
            let bytes = microseconds_per_beat.to_be_bytes();
            write_meta(0x51, &bytes[1..], buffer);
        }
        MidiEvent::TimeSignature {
            numerator,
            denominator_power,
        } => {
            // nn dd cc bb: clocks per click 24, 8 32nds per quarter
            write_meta(0x58, &[*numerator, *denominator_power, 24, 8], buffer);
        }
        MidiEvent::KeySignature { sharps, minor } => {
            write_meta(0x59, &[*sharps as u8, u8::from(*minor)], buffer);
        }
        MidiEvent::TrackName { name } => write_meta(0x03, name.as_bytes(), buffer),
        MidiEvent::Marker { text } => write_meta(0x06, text.as_bytes(), buffer),
        MidiEvent::EndOfTrack => write_meta(0x2F, &[], buffer),
    }
}

/// Builds the track chunk data from a list of timed events.
///
/// Events are sorted (stably) by tick position and priority, then written
/// with delta times.
fn build_track_data(events: &mut [TimedEvent], running_status: bool) -> Vec<u8> {
    let mut buffer = Vec::new();
    events.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.priority.cmp(&b.priority)));

    let mut last_tick = 0u32;
    let mut running: Option<u8> = None;
    for timed_event in events.iter() {
        let delta = timed_event.tick.saturating_sub(last_tick);
        write_vlq(delta, &mut buffer);
        write_event(&timed_event.event, running, &mut buffer);
        running = if running_status {
            timed_event.event.channel_status()
        } else {
            None
        };
        last_tick = timed_event.tick;
    }

    buffer
}

/// Appends a track chunk; the length is known only once `track_data` is
/// fully built.
fn write_track_chunk(out: &mut Vec<u8>, track_data: &[u8]) {
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
    out.extend_from_slice(track_data);
}

/// Lowers a score to per-track MIDI notes without serializing.
///
/// # Errors
///
/// [`Error::InvalidResolution`] for a resolution outside 1..=0x7FFF and
/// [`Error::ScoreInvalid`] with the first violation if the score fails
/// validation.
///
/// Songs longer than [`MAX_TICK`] at the chosen resolution are cut there:
/// later notes and markers are dropped and notes crossing it are shortened,
/// each with a warning.
pub fn render(score: &Score, options: &EncodeOptions) -> Result<RenderedSong> {
    let tpq = options.ticks_per_quarter;
    if tpq == 0 || tpq > 0x7FFF {
        return Err(Error::InvalidResolution(tpq));
    }
    if let Some(violation) = score.validate().into_iter().next() {
        return Err(Error::ScoreInvalid(violation));
    }

    let to_ticks = |divisions: u32| divisions_to_ticks(divisions, tpq);
    let offsets = score.section_offsets();
    let bar = score.time_signature().bar_divisions();
    let map = options.instrument_map();
    let mut allocator = ChannelAllocator::new();
    let mut warnings = Vec::new();
    let mut tracks = Vec::new();

    for logical in score.logical_tracks() {
        let assignment = allocator.assign(map, logical.name, logical.is_drum_only());
        if assignment.matched_keyword.is_none() && !assignment.percussion {
            tracing::warn!(
                "No instrument matches track {:?}; using program {}",
                logical.name,
                assignment.program
            );
            warnings.push(EncoderWarning {
                track: logical.name.to_string(),
                message: format!(
                    "no instrument keyword matches; using default program {}",
                    assignment.program
                ),
            });
        }

        let mut notes = Vec::new();
        let mut clamped = 0usize;
        let mut too_short = 0usize;
        let mut past_end = 0usize;
        let mut push = |pitch: i16, velocity: u8, start: u32, end: u32| {
            let (start_tick, end_tick) = (to_ticks(start), to_ticks(end));
            if start_tick >= MAX_TICK {
                past_end += 1;
                return;
            }
            if end_tick > MAX_TICK {
                past_end += 1;
            }
            let end_tick = end_tick.min(MAX_TICK);
            if end_tick <= start_tick {
                too_short += 1;
                return;
            }
            if !(0..=127).contains(&pitch) {
                clamped += 1;
            }
            notes.push(Note::new(
                pitch.clamp(0, 127) as u8,
                velocity,
                start_tick,
                end_tick - start_tick,
            ));
        };

        for (section_index, track) in &logical.parts {
            let base = offsets[*section_index];
            for event in track.events() {
                let velocity = options.velocities.velocity(event.dynamic());
                match event.kind() {
                    EventKind::Chord(_) | EventKind::Note(_) => {
                        let (start, end) = (
                            base.saturating_add(event.onset()),
                            base.saturating_add(event.end()),
                        );
                        for pitch in event.resolved_pitches() {
                            push(pitch, velocity, start, end);
                        }
                    }
                    EventKind::Drum(hit) => {
                        for offset in event.drum_hits(bar) {
                            let end = (offset + DRUM_HIT_DIVISIONS).min(event.end());
                            push(
                                hit.key as i16,
                                velocity,
                                base.saturating_add(offset),
                                base.saturating_add(end),
                            );
                        }
                    }
                    EventKind::Rest(_) => {}
                }
            }
        }

        if clamped > 0 {
            warnings.push(EncoderWarning {
                track: logical.name.to_string(),
                message: format!("{} pitch(es) clamped to the MIDI range", clamped),
            });
        }
        if past_end > 0 {
            tracing::warn!(
                "Track {:?}: {} note(s) reach past tick {}",
                logical.name,
                past_end,
                MAX_TICK
            );
            warnings.push(EncoderWarning {
                track: logical.name.to_string(),
                message: format!(
                    "{} note(s) past the longest encodable time (tick {}) were dropped or shortened",
                    past_end, MAX_TICK
                ),
            });
        }
        if too_short > 0 {
            warnings.push(EncoderWarning {
                track: logical.name.to_string(),
                message: format!(
                    "{} note(s) shorter than one tick at {} ticks per quarter were dropped",
                    too_short, tpq
                ),
            });
        }
        tracing::debug!(
            "Track {:?}: channel {}, program {}, {} notes",
            logical.name,
            assignment.channel,
            assignment.program,
            notes.len()
        );
        tracks.push(RenderedTrack { assignment, notes });
    }

    let markers: Vec<(u32, String)> = score
        .sections()
        .iter()
        .zip(&offsets)
        .map(|(section, offset)| (to_ticks(*offset), section.name().to_string()))
        .filter(|(tick, _)| *tick <= MAX_TICK)
        .collect();

    let full_end = to_ticks(score.total_divisions());
    if full_end > MAX_TICK {
        tracing::warn!(
            "Song runs to tick {} at {} ticks per quarter; cut at {}",
            full_end,
            tpq,
            MAX_TICK
        );
        warnings.push(EncoderWarning {
            track: score.title().to_string(),
            message: format!(
                "song runs to tick {}, cut at tick {}; {} of {} section marker(s) kept",
                full_end,
                MAX_TICK,
                markers.len(),
                score.sections().len()
            ),
        });
    }

    Ok(RenderedSong {
        ticks_per_quarter: tpq,
        end_tick: full_end.min(MAX_TICK),
        markers,
        tracks,
        warnings,
    })
}

/// Serializes a rendered song as SMF Format 1 bytes.
#[allow(clippy::vec_init_then_push)]
fn serialize(score: &Score, song: &RenderedSong, running_status: bool) -> Vec<u8> {
    let mut out = Vec::new();

    // Number of tracks: 1 tempo track + N music tracks
    let num_tracks = 1 + song.tracks.len() as u16;

    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes()); // Header length (always 6)
    out.extend_from_slice(&1u16.to_be_bytes()); // Format 1 (multi-track)
    out.extend_from_slice(&num_tracks.to_be_bytes());
    out.extend_from_slice(&song.ticks_per_quarter.to_be_bytes());

    // Track 0: song-wide meta events
    {
        let mut events = Vec::new();
        let time_signature = score.time_signature();

        events.push(TimedEvent::new(
            0,
            MidiEvent::TrackName {
                name: score.title().to_string(),
            },
            0,
        ));
        events.push(TimedEvent::new(
            0,
            MidiEvent::TimeSignature {
                numerator: time_signature.numerator,
                denominator_power: time_signature.denominator_power(),
            },
            1,
        ));
        if let Some(key) = score.parsed_key() {
            if let Some(sharps) = key.signature() {
                events.push(TimedEvent::new(
                    0,
                    MidiEvent::KeySignature {
                        sharps,
                        minor: key.mode == crate::score::Mode::Minor,
                    },
                    2,
                ));
            }
        }
        // Convert BPM to microseconds per beat: 60,000,000 / BPM
        events.push(TimedEvent::new(
            0,
            MidiEvent::SetTempo {
                microseconds_per_beat: 60_000_000 / score.tempo().max(1),
            },
            3,
        ));
        for (tick, name) in &song.markers {
            events.push(TimedEvent::new(
                *tick,
                MidiEvent::Marker { text: name.clone() },
                4,
            ));
        }
        events.push(TimedEvent::new(song.end_tick, MidiEvent::EndOfTrack, PRIORITY_END));

        let track_data = build_track_data(&mut events, running_status);
        write_track_chunk(&mut out, &track_data);
    }

    // Tracks 1-N: Music data
    for track in &song.tracks {
        let channel = track.assignment.channel;
        let mut events = Vec::new();

        events.push(TimedEvent::new(
            0,
            MidiEvent::TrackName {
                name: track.assignment.track.clone(),
            },
            0,
        ));
        events.push(TimedEvent::new(
            0,
            MidiEvent::ProgramChange {
                channel,
                program: track.assignment.program,
            },
            1,
        ));
        events.push(TimedEvent::new(
            0,
            MidiEvent::ControlChange {
                channel,
                controller: 7, // Volume
                value: TRACK_VOLUME,
            },
            2,
        ));
        events.push(TimedEvent::new(
            0,
            MidiEvent::ControlChange {
                channel,
                controller: 10, // Pan
                value: TRACK_PAN,
            },
            3,
        ));

        for note in &track.notes {
            events.push(TimedEvent::new(
                note.start_tick,
                MidiEvent::NoteOn {
                    channel,
                    pitch: note.pitch,
                    velocity: note.velocity,
                },
                PRIORITY_NOTE_ON,
            ));
            events.push(TimedEvent::new(
                note.end_tick(),
                MidiEvent::NoteOff {
                    channel,
                    pitch: note.pitch,
                },
                PRIORITY_NOTE_OFF,
            ));
        }

        let track_end = track
            .notes
            .iter()
            .map(|n| n.end_tick())
            .max()
            .unwrap_or(0)
            .max(song.end_tick);
        events.push(TimedEvent::new(track_end, MidiEvent::EndOfTrack, PRIORITY_END));

        let track_data = build_track_data(&mut events, running_status);
        write_track_chunk(&mut out, &track_data);
    }

    out
}

/// Encodes a score as Standard MIDI File bytes.
///
/// ```
/// use tunescript::{midi, parse};
///
/// let (score, _) = parse("SONG: Test\nSECTION: A [1 bar]\n  PIANO: C(w)").unwrap();
/// let bytes = midi::encode(&score, &midi::EncodeOptions::default()).unwrap();
/// assert_eq!(&bytes[..4], b"MThd");
/// ```
///
/// # Errors
///
/// Same as [`render`].
pub fn encode(score: &Score, options: &EncodeOptions) -> Result<Vec<u8>> {
    Ok(encode_with_report(score, options)?.bytes)
}

/// Encodes a score and also returns the instrument assignments and
/// per-track warnings.
pub fn encode_with_report(score: &Score, options: &EncodeOptions) -> Result<Encoded> {
    let song = render(score, options)?;
    let bytes = serialize(score, &song, options.running_status);
    tracing::info!(
        "Encoded {:?}: {} track(s), {} bytes, {:.1}s",
        score.title(),
        song.tracks.len(),
        bytes.len(),
        ticks_to_seconds(song.end_tick, score.tempo(), song.ticks_per_quarter)
    );
    Ok(Encoded {
        bytes,
        assignments: song.tracks.into_iter().map(|t| t.assignment).collect(),
        warnings: song.warnings,
    })
}

/// Encodes a score and writes it to a `.mid` file.
pub fn export_to_midi<P: AsRef<Path>>(
    score: &Score,
    options: &EncodeOptions,
    path: P,
) -> Result<()> {
    fs::write(path, encode(score, options)?)?;
    Ok(())
}
