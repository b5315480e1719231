//! A rendered MIDI note.
//!
//! The encoder lowers every chord tone, single note and drum hit of a score
//! into one of these before serializing; the decoder produces the same type,
//! which makes encode/decode comparisons direct.

use super::note_to_name;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single note-on/note-off pair with absolute tick timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Note {
    /// Start time in ticks from the beginning of the song.
    pub start_tick: u32,

    /// MIDI note number (0-127). 60 = Middle C (C4).
    pub pitch: u8,

    /// Duration in ticks. Determines how long the note sounds.
    pub duration_ticks: u32,

    /// Note velocity (1-127).
    pub velocity: u8,
}

impl Note {
    /// Creates a new note, clamping pitch to 0-127 and velocity to 1-127
    /// (velocity 0 would read as a note-off).
    ///
    /// ```
    /// use tunescript::midi::Note;
    ///
    /// // Create a middle C, quarter note at beat 1, medium velocity
    /// let note = Note::new(60, 100, 0, 480);
    /// assert_eq!(note.end_tick(), 480);
    /// ```
    pub fn new(pitch: u8, velocity: u8, start_tick: u32, duration_ticks: u32) -> Self {
        Self {
            start_tick,
            pitch: pitch.min(127),
            duration_ticks,
            velocity: velocity.clamp(1, 127),
        }
    }

    /// Returns the end tick of this note (start + duration).
    pub fn end_tick(&self) -> u32 {
        self.start_tick.saturating_add(self.duration_ticks)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}+{} v{}",
            note_to_name(self.pitch),
            self.start_tick,
            self.duration_ticks,
            self.velocity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_creation() {
        let note = Note::new(60, 100, 0, 480);
        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 100);
        assert_eq!(note.start_tick, 0);
        assert_eq!(note.duration_ticks, 480);
    }

    #[test]
    fn test_note_clamping() {
        let note = Note::new(200, 200, 0, 480);
        assert_eq!(note.pitch, 127);
        assert_eq!(note.velocity, 127);
        assert_eq!(Note::new(60, 0, 0, 480).velocity, 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Note::new(69, 88, 960, 240).to_string(), "A4@960+240 v88");
    }
}
