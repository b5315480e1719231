//! Pre-cleaning and line classification.
//!
//! Notation usually arrives wrapped in chat prose and markdown, sometimes
//! folded onto a single line. Pre-cleaning turns it back into one statement
//! per line; classification then tells metadata, section headers and track
//! lines apart. Anything else is left for the caller to record as skipped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Folded text gets unfolded before every keyword and every upper-case
/// label.
static FOLD_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:\b(?:song|title|tempo|bpm|key|time\s+signature|time|meter|section)\s*:)|\b[A-Z][A-Z0-9_]*\s*:",
    )
    .unwrap()
});

static KEYWORD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(song|title|tempo|bpm|key|time\s+signature|time|meter|section)\s*:\s*(.*)$",
    )
    .unwrap()
});

static TRACK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][\w \-]*?)\s*:\s*(.*)$").unwrap());

/// Folded input has fewer line breaks than this.
const FOLDED_MAX_BREAKS: usize = 5;

/// One line of cleaned input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SourceLine {
    /// 1-based, counted after unfolding.
    pub number: usize,
    pub text: String,
}

/// What a cleaned line holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum LineKind<'a> {
    Title(&'a str),
    Tempo(&'a str),
    Key(&'a str),
    TimeSignature(&'a str),
    Section(&'a str),
    Track { label: String, body: &'a str },
}

/// Splits `text` into cleaned lines, dropping blank lines and code fences.
pub(super) fn preclean(text: &str) -> Vec<SourceLine> {
    let unfolded = unfold(text);
    unfolded
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = clean_line(raw)?;
            Some(SourceLine {
                number: i + 1,
                text,
            })
        })
        .collect()
}

fn unfold(text: &str) -> String {
    let breaks = text.matches('\n').count();
    if breaks >= FOLDED_MAX_BREAKS || !text.to_uppercase().contains("SECTION:") {
        return text.to_string();
    }
    tracing::debug!("Unfolding single-line notation");
    FOLD_POINT
        .replace_all(text, |caps: &Captures| format!("\n{}", &caps[0]))
        .into_owned()
}

fn clean_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.starts_with("```") {
        return None;
    }
    let line = match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    };
    let line = line
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '-' | '>') || c.is_whitespace())
        .trim_end_matches(|c: char| c == '*' || c.is_whitespace());
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Classifies a cleaned line; `None` means it isn't notation.
pub(super) fn classify(line: &str) -> Option<LineKind<'_>> {
    if let Some(caps) = KEYWORD_LINE.captures(line) {
        let value = caps.get(2).map_or("", |m| m.as_str()).trim();
        let keyword = caps[1].to_lowercase();
        let kind = match keyword.split_whitespace().next().unwrap_or_default() {
            "song" | "title" => LineKind::Title(value),
            "tempo" | "bpm" => LineKind::Tempo(value),
            "key" => LineKind::Key(value),
            "section" => LineKind::Section(value),
            // time, time signature, meter
            _ => LineKind::TimeSignature(value),
        };
        return Some(kind);
    }
    let caps = TRACK_LINE.captures(line)?;
    let label = caps[1].trim().to_uppercase();
    let body = caps.get(2).map_or("", |m| m.as_str()).trim();
    Some(LineKind::Track { label, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[SourceLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_preclean_strips_decoration() {
        let lines = preclean(
            "Here you go!\n```\n**SECTION: A [2 bars]**\n- PIANO: C(w) // tonic\n\n> BASS: C2(w)\n```",
        );
        assert_eq!(
            texts(&lines),
            vec!["Here you go!", "SECTION: A [2 bars]", "PIANO: C(w)", "BASS: C2(w)"]
        );
        assert_eq!(lines[1].number, 3);
    }

    #[test]
    fn test_unfolds_single_line() {
        let lines = preclean(
            "SONG: Folded TEMPO: 90 SECTION: Verse [2 bars] PIANO: C(w) | G(w) BASS: C2(w) | G1(w)",
        );
        assert_eq!(
            texts(&lines),
            vec![
                "SONG: Folded",
                "TEMPO: 90",
                "SECTION: Verse [2 bars]",
                "PIANO: C(w) | G(w)",
                "BASS: C2(w) | G1(w)",
            ]
        );
    }

    #[test]
    fn test_multi_line_text_is_not_unfolded() {
        let text = "SONG: A\nTEMPO: 90\nKEY: C\n\nSECTION: B [1 bar]\n  PIANO: C(w) LEAD: x\n";
        let lines = preclean(text);
        assert_eq!(lines.last().unwrap().text, "PIANO: C(w) LEAD: x");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("SONG: Test"), Some(LineKind::Title("Test")));
        assert_eq!(classify("title:  Night Drive "), Some(LineKind::Title("Night Drive")));
        assert_eq!(classify("Tempo: 100 BPM"), Some(LineKind::Tempo("100 BPM")));
        assert_eq!(classify("BPM:96"), Some(LineKind::Tempo("96")));
        assert_eq!(classify("KEY: Am"), Some(LineKind::Key("Am")));
        assert_eq!(classify("Time Signature: 3/4"), Some(LineKind::TimeSignature("3/4")));
        assert_eq!(classify("METER: 6/8"), Some(LineKind::TimeSignature("6/8")));
        assert_eq!(
            classify("section: Chorus (8 bars)"),
            Some(LineKind::Section("Chorus (8 bars)"))
        );
        assert_eq!(
            classify("synth pad: Am(w)"),
            Some(LineKind::Track {
                label: "SYNTH PAD".into(),
                body: "Am(w)"
            })
        );
        assert_eq!(classify("(just a comment)"), None);
        assert_eq!(classify("12 bars of fun"), None);
    }
}
