//! Percussion vocabulary: drum names recognized by the drum grammar and the
//! General MIDI key each one plays on the percussion channel.

/// Drum names (lower case, underscores) and their GM percussion keys.
const DRUM_KIT: &[(&str, u8)] = &[
    ("kick", 36),
    ("bd", 36),
    ("bass", 36),
    ("bass_drum", 36),
    ("snare", 38),
    ("sd", 38),
    ("rimshot", 37),
    ("rim", 37),
    ("sidestick", 37),
    ("clap", 39),
    ("hat", 42),
    ("hh", 42),
    ("hihat", 42),
    ("hi_hat", 42),
    ("closed_hat", 42),
    ("pedal_hat", 44),
    ("open_hat", 46),
    ("oh", 46),
    ("floor_tom", 41),
    ("tom_low", 45),
    ("low_tom", 45),
    ("tom", 47),
    ("tom_mid", 47),
    ("mid_tom", 47),
    ("tom_high", 50),
    ("high_tom", 50),
    ("crash", 49),
    ("ride", 51),
    ("china", 52),
    ("bell", 53),
    ("ride_bell", 53),
    ("tambourine", 54),
    ("tamb", 54),
    ("splash", 55),
    ("cowbell", 56),
    ("shaker", 70),
];

/// Normalizes a drum name: lower case, spaces and hyphens become underscores.
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Returns the GM percussion key for a drum name, if it is in the vocabulary.
///
/// ```
/// use tunescript::score::drum_key;
///
/// assert_eq!(drum_key("Kick"), Some(36));
/// assert_eq!(drum_key("open-hat"), Some(46));
/// assert_eq!(drum_key("theremin"), None);
/// ```
pub fn drum_key(name: &str) -> Option<u8> {
    let name = normalize(name);
    DRUM_KIT.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
}

/// Canonical spelling used when storing a drum name in a score.
pub fn canonical_drum_name(name: &str) -> String {
    normalize(name)
}
