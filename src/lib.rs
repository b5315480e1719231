//! tunescript - compiles loosely formatted song notation into Standard MIDI Files.
//!
//! The pipeline is parse, validate, encode:
//!
//! ```
//! let text = "SONG: Demo\nTEMPO: 100\nSECTION: Verse [1 bar]\nPIANO: C(q) | F(q) | G(h)\n";
//! let (score, report) = tunescript::parse(text).unwrap();
//! assert!(report.is_clean());
//! let bytes = tunescript::encode(&score, &tunescript::EncodeOptions::default()).unwrap();
//! assert_eq!(&bytes[..4], b"MThd");
//! ```

pub mod config;
pub mod error;
pub mod midi;
pub mod parser;
pub mod score;

// Re-export commonly used types
pub use config::{Config, ParserConfig};
pub use error::{Error, Result};
pub use midi::{encode, encode_with_report, EncodeOptions};
pub use parser::{parse, ParseReport, Parser};
pub use score::Score;
