//! Standard MIDI File output (and input, for checking what was written).
//!
//! The encoder turns a [`Score`](crate::score::Score) into SMF bytes; the
//! decoder reads SMF bytes back into per-track note lists. Instrument mapping
//! and the dynamic-to-velocity table live here too since only the encoder
//! consumes them.

mod decoder;
mod encoder;
mod instruments;
mod note;
mod velocity;

pub use decoder::{decode, DecodedSong, DecodedTrack};
pub use encoder::{
    encode, encode_with_report, export_to_midi, render, EncodeOptions, Encoded, EncoderWarning,
    RenderedSong, RenderedTrack,
};
pub use instruments::{InstrumentAssignment, InstrumentEntry, InstrumentMap, Voice};
pub use note::Note;
pub use velocity::VelocityTable;

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// ```
/// use tunescript::midi::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Default resolution: ticks per quarter note.
pub const TICKS_PER_BEAT: u16 = 480;

/// Latest tick an event may sit on: the largest delta time a four-byte
/// VLQ can hold, so every delta in a track fits too.
pub const MAX_TICK: u32 = 0x0FFF_FFFF;

/// Percussion channel (channel 10, zero-based).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// SoundFont bank holding drum kits.
pub const PERCUSSION_BANK: u16 = 128;

/// Converts ticks to seconds at `tempo` BPM and `ticks_per_quarter`.
pub fn ticks_to_seconds(ticks: u32, tempo: u32, ticks_per_quarter: u16) -> f64 {
    let beats = ticks as f64 / ticks_per_quarter.max(1) as f64;
    beats * 60.0 / tempo.max(1) as f64
}
