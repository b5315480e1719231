//! Parser and encoder settings, loadable from a JSON file.
//!
//! Every field has a default, so `{}` (or a file naming only the settings
//! that differ) is a complete configuration:
//!
//! ```json
//! {
//!   "parser": { "default_tempo": 96, "align_bars": true },
//!   "encoder": { "ticks_per_quarter": 960, "running_status": true }
//! }
//! ```

use crate::error::Result;
use crate::midi::EncodeOptions;
use crate::score::{
    Duration, Dynamic, NoteValue, DEFAULT_BARS, DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest bar count a section header may ask for before it is clamped.
pub const DEFAULT_MAX_BARS: u32 = 512;

/// Default octave for chord roots written without one.
pub const DEFAULT_OCTAVE: i8 = 4;

/// Picks a default octave for tracks whose name contains `keyword`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRule {
    /// Lower-case substring of the track name.
    pub keyword: String,
    pub octave: i8,
}

impl RegisterRule {
    pub fn new(keyword: impl Into<String>, octave: i8) -> Self {
        Self {
            keyword: keyword.into(),
            octave,
        }
    }
}

/// Parser fallbacks and options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Tempo when the text gives none (or an unreadable one).
    pub default_tempo: u32,
    /// Bars for a section header without a usable count.
    pub default_bars: u32,
    /// Upper bound on a section's bar count.
    pub max_bars: u32,
    /// Octave for chord roots when no register rule matches.
    pub default_octave: i8,
    /// Duration of a chord or note with no duration argument.
    #[serde(with = "duration_text")]
    pub default_duration: Duration,
    /// Dynamic of a chord or note with no dynamic argument.
    pub default_dynamic: Dynamic,
    /// Start every `|` segment of a melodic line on a bar line instead of
    /// right after the previous event.
    pub align_bars: bool,
    /// Register rules, checked in order; the first keyword found in the
    /// lower-cased track name wins.
    pub registers: Vec<RegisterRule>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_tempo: DEFAULT_TEMPO,
            default_bars: DEFAULT_BARS,
            max_bars: DEFAULT_MAX_BARS,
            default_octave: DEFAULT_OCTAVE,
            default_duration: Duration::new(NoteValue::Quarter),
            default_dynamic: Dynamic::Mf,
            align_bars: false,
            registers: vec![
                RegisterRule::new("bass", 2),
                RegisterRule::new("tuba", 2),
                RegisterRule::new("cello", 3),
                RegisterRule::new("lead", 5),
                RegisterRule::new("flute", 5),
                RegisterRule::new("piccolo", 5),
                RegisterRule::new("violin", 5),
                RegisterRule::new("trumpet", 5),
                RegisterRule::new("sax", 5),
            ],
        }
    }
}

impl ParserConfig {
    /// Default octave for chords on the track named `track`.
    ///
    /// ```
    /// use tunescript::config::ParserConfig;
    ///
    /// let config = ParserConfig::default();
    /// assert_eq!(config.register_for("SYNTH BASS"), 2);
    /// assert_eq!(config.register_for("PIANO"), 4);
    /// ```
    pub fn register_for(&self, track: &str) -> i8 {
        let name = track.to_lowercase();
        self.registers
            .iter()
            .find(|rule| !rule.keyword.is_empty() && name.contains(&rule.keyword.to_lowercase()))
            .map_or(self.default_octave, |rule| rule.octave)
    }

    /// Tempo to fall back on, kept inside the range a score may carry.
    pub fn fallback_tempo(&self) -> u32 {
        self.default_tempo.clamp(MIN_TEMPO, MAX_TEMPO)
    }

    /// Largest bar count a section may have; at least 1.
    pub fn bar_limit(&self) -> u32 {
        self.max_bars.max(1)
    }

    /// Bar count for headers without one; between 1 and [`bar_limit`](Self::bar_limit).
    pub fn fallback_bars(&self) -> u32 {
        self.default_bars.clamp(1, self.bar_limit())
    }
}

/// Everything the command line can load from `--config`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parser: ParserConfig,
    pub encoder: EncodeOptions,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Durations in configuration files are written the way the notation
/// writes them (`"q"`, `"dh"`, `"h~q"`).
mod duration_text {
    use crate::score::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(duration)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        Duration::parse(&text).ok_or_else(|| D::Error::custom(format!("invalid duration {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::VelocityTable;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_json() {
        let config = Config::from_json(
            r#"{
                "parser": { "default_tempo": 90, "default_duration": "dq", "default_dynamic": "p" },
                "encoder": { "ticks_per_quarter": 960, "velocities": [8, 16, 32, 48, 64, 80, 96, 112] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.parser.default_tempo, 90);
        assert_eq!(config.parser.default_duration, Duration::dotted(NoteValue::Quarter));
        assert_eq!(config.parser.default_dynamic, Dynamic::P);
        assert_eq!(config.parser.max_bars, DEFAULT_MAX_BARS);
        assert_eq!(config.encoder.ticks_per_quarter, 960);
        assert_eq!(config.encoder.velocities.velocity(Dynamic::Fff), 112);
        assert!(!config.encoder.running_status);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_json(r#"{"parser": {"default_duration": "long"}}"#).is_err());
        assert!(Config::from_json(r#"{"encoder": {"velocities": [1, 1, 1, 1, 1, 1, 1, 1]}}"#).is_err());
    }

    #[test]
    fn test_register_rules() {
        let config = ParserConfig::default();
        assert_eq!(config.register_for("BASS"), 2);
        assert_eq!(config.register_for("CONTRABASS"), 2);
        assert_eq!(config.register_for("CELLO"), 3);
        assert_eq!(config.register_for("LEAD SYNTH"), 5);
        assert_eq!(config.register_for("STRINGS"), 4);

        let custom = ParserConfig {
            registers: vec![RegisterRule::new("pad", 3)],
            default_octave: 5,
            ..ParserConfig::default()
        };
        assert_eq!(custom.register_for("WARM PAD"), 3);
        assert_eq!(custom.register_for("BASS"), 5);
    }

    #[test]
    fn test_fallbacks_stay_in_range() {
        let config = ParserConfig::default();
        assert_eq!(config.fallback_tempo(), DEFAULT_TEMPO);
        assert_eq!(config.fallback_bars(), DEFAULT_BARS);
        assert_eq!(config.bar_limit(), DEFAULT_MAX_BARS);

        let broken = ParserConfig {
            default_tempo: 0,
            default_bars: 0,
            max_bars: 0,
            ..ParserConfig::default()
        };
        assert_eq!(broken.fallback_tempo(), MIN_TEMPO);
        assert_eq!(broken.fallback_bars(), 1);
        assert_eq!(broken.bar_limit(), 1);

        let fast = ParserConfig {
            default_tempo: 1000,
            default_bars: 64,
            max_bars: 16,
            ..ParserConfig::default()
        };
        assert_eq!(fast.fallback_tempo(), MAX_TEMPO);
        assert_eq!(fast.fallback_bars(), 16);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunescript.json");
        let config = Config {
            encoder: EncodeOptions {
                running_status: true,
                velocities: VelocityTable::default(),
                ..EncodeOptions::default()
            },
            ..Config::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
