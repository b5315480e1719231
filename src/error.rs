//! Error types shared by the parser, score model and MIDI encoder.
//!
//! Only two situations are fatal for the pipeline itself: text with no
//! recognizable song structure, and an attempt to encode a score that fails
//! validation. Everything else is reported as a warning and recovered from.

use crate::score::Violation;
use thiserror::Error;

/// Errors produced by the notation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The text contained no `SONG:` or `SECTION:` line at all.
    #[error("no SONG: or SECTION: line found in {lines} line(s) of input")]
    EmptyOrUnrecognizedInput { lines: usize },

    /// The score broke one of its structural invariants.
    #[error("score failed validation: {0}")]
    ScoreInvalid(Violation),

    /// Ticks-per-quarter must be in 1..=0x7FFF (bit 15 selects SMPTE timing).
    #[error("invalid ticks-per-quarter resolution {0}")]
    InvalidResolution(u16),

    /// A velocity table override was not strictly increasing or out of range.
    #[error("invalid velocity table: {0}")]
    InvalidVelocityTable(String),

    /// MIDI bytes could not be decoded.
    #[error("MIDI decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Binary(#[from] bincode::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
