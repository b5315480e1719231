//! tunescript - turns song notation text into a Standard MIDI File.
//!
//! # Usage
//!
//! ```bash
//! tunescript song.txt                     # writes song.mid
//! tunescript song.txt -o out.mid --json song.json
//! cat song.txt | tunescript - -o out.mid
//! RUST_LOG=tunescript=debug tunescript song.txt
//! ```

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tunescript::config::Config;
use tunescript::midi::encode_with_report;
use tunescript::Parser;

/// Command-line options.
struct CliOptions {
    /// Notation file; `None` reads stdin.
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    /// Also save the parsed score as JSON here.
    json: Option<PathBuf>,
    config: Option<PathBuf>,
    ticks_per_quarter: Option<u16>,
    running_status: bool,
    align_bars: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `<INPUT>`: notation file, or `-` for stdin
    /// - `--output <path>` or `-o <path>`: MIDI file to write
    /// - `--json <path>`: also save the parsed score as JSON
    /// - `--config <path>`: JSON configuration file
    /// - `--tpq <n>`: MIDI resolution in ticks per quarter note
    /// - `--running-status`: write compact running-status MIDI
    /// - `--align-bars`: start each `|` segment on a bar line
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self {
            input: None,
            output: None,
            json: None,
            config: None,
            ticks_per_quarter: None,
            running_status: false,
            align_bars: false,
        };
        let mut input_seen = false;
        let mut i = 1;

        let value = |i: usize, flag: &str| -> Result<&String> {
            args.get(i)
                .with_context(|| format!("{} requires an argument", flag))
        };

        while i < args.len() {
            match args[i].as_str() {
                "--output" | "-o" => {
                    i += 1;
                    options.output = Some(PathBuf::from(value(i, "--output")?));
                }
                "--json" => {
                    i += 1;
                    options.json = Some(PathBuf::from(value(i, "--json")?));
                }
                "--config" => {
                    i += 1;
                    options.config = Some(PathBuf::from(value(i, "--config")?));
                }
                "--tpq" => {
                    i += 1;
                    let tpq = value(i, "--tpq")?;
                    options.ticks_per_quarter = Some(
                        tpq.parse()
                            .with_context(|| format!("Invalid --tpq value: {}", tpq))?,
                    );
                }
                "--running-status" => options.running_status = true,
                "--align-bars" => options.align_bars = true,
                "--help" | "-h" => {
                    print_help(args.first().map_or("tunescript", String::as_str));
                    std::process::exit(0);
                }
                other if other.starts_with('-') && other != "-" => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if input_seen {
                        bail!("Only one input file may be given (found {:?})", other);
                    }
                    input_seen = true;
                    if other != "-" {
                        options.input = Some(PathBuf::from(other));
                    }
                }
            }
            i += 1;
        }

        if !input_seen {
            eprintln!("Error: no input given (use - for stdin)");
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
        Ok(options)
    }

    /// Where the MIDI file goes: `-o`, else the input with a `.mid`
    /// extension, else `out.mid`.
    fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        match &self.input {
            Some(input) => input.with_extension("mid"),
            None => PathBuf::from("out.mid"),
        }
    }
}

fn print_help(program: &str) {
    eprintln!("tunescript - song notation to Standard MIDI File");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] <INPUT>", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <INPUT>               Notation file, or - to read stdin");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output PATH     MIDI file to write (default: INPUT with .mid)");
    eprintln!("      --json PATH       Also save the parsed score as JSON");
    eprintln!("      --config PATH     Load parser/encoder settings from a JSON file");
    eprintln!("      --tpq N           Ticks per quarter note (default 480)");
    eprintln!("      --running-status  Write running-status (smaller) MIDI");
    eprintln!("      --align-bars      Start every | segment on a bar line");
    eprintln!("  -h, --help            Print this help message");
    eprintln!();
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=tunescript=debug) for diagnostics.");
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(tpq) = cli.ticks_per_quarter {
        config.encoder.ticks_per_quarter = tpq;
    }
    config.encoder.running_status |= cli.running_status;
    config.parser.align_bars |= cli.align_bars;

    let text = read_input(cli.input.as_ref())?;
    let (score, report) = Parser::new(config.parser.clone())
        .parse(&text)
        .context("Failed to parse notation")?;

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    for violation in &report.violations {
        eprintln!("error: {}", violation);
    }

    if let Some(path) = &cli.json {
        score
            .save_to_file(path)
            .with_context(|| format!("Failed to save score to {}", path.display()))?;
    }

    let encoded = encode_with_report(&score, &config.encoder).context("Failed to encode MIDI")?;
    for warning in &encoded.warnings {
        eprintln!("warning: [{}] {}", warning.track, warning.message);
    }

    let output = cli.output_path();
    fs::write(&output, &encoded.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{}: {} section(s), {} bar(s), {:.1}s at {} BPM -> {}",
        score.title(),
        score.sections().len(),
        score.total_bars(),
        score.duration_seconds(),
        score.tempo(),
        output.display()
    );
    for assignment in &encoded.assignments {
        let voice = if assignment.percussion {
            "drums".to_string()
        } else {
            format!("program {}", assignment.program)
        };
        println!(
            "  {:<12} channel {:>2}  {}",
            assignment.track,
            assignment.channel + 1,
            voice
        );
    }

    Ok(())
}
