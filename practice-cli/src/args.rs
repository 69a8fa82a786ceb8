//! Command-line parsing for the practice listener.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use practice_core::tuning::{self, STANDARD_GUITAR};

pub const USAGE: &str = "\
usage: practice-cli <tuner|chords> [options]

options:
  --target <HZ|NOTE>     tune against a reference, e.g. 110 or A2 (tuner only)
  --string <1-6>         tune against a guitar string, 6 = low E (tuner only)
  --simulate <HZ,...>    analyze generated sines instead of the microphone
  --config <FILE>        JSON file with \"tuner\" and/or \"chords\" settings
  --json                 print one JSON object per result
  --cycles <N>           stop after N results (default: until stdin closes)
  -h, --help             show this help";

/// Which pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Tuner,
    Chords,
}

/// Where the tuner's reference comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Hz(f64),
    Note(String),
    GuitarString(usize),
}

impl TargetSpec {
    /// Resolves the target to a frequency at the given reference pitch.
    pub fn resolve(&self, reference_a4: f64) -> Result<f64> {
        match self {
            TargetSpec::Hz(hz) => Ok(*hz),
            TargetSpec::Note(label) => tuning::parse_note(label, reference_a4)
                .ok_or_else(|| anyhow!("unknown note {label:?}, expected something like A2 or C#4")),
            TargetSpec::GuitarString(n) => {
                // String 6 is the lowest.
                let note = 6usize
                    .checked_sub(*n)
                    .and_then(|index| STANDARD_GUITAR.get(index))
                    .ok_or_else(|| anyhow!("guitar strings are numbered 1 to 6"))?;
                Ok(note.frequency * reference_a4 / tuning::DEFAULT_REFERENCE_A4)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub mode: Mode,
    pub target: Option<TargetSpec>,
    /// Frequencies to synthesize; `None` means use the microphone.
    pub simulate: Option<Vec<f64>>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub cycles: Option<usize>,
}

/// Parsed command line, or a request for help.
#[derive(Debug, PartialEq)]
pub enum Command {
    Run(Options),
    Help,
}

pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mode = match args.next().as_deref() {
        Some("tuner") => Mode::Tuner,
        Some("chords") => Mode::Chords,
        Some("-h") | Some("--help") => return Ok(Command::Help),
        Some(other) => bail!("unknown mode {other:?}\n\n{USAGE}"),
        None => bail!("missing mode\n\n{USAGE}"),
    };

    let mut options = Options {
        mode,
        target: None,
        simulate: None,
        config: None,
        json: false,
        cycles: None,
    };

    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| anyhow!("{name} needs a value"))
        };
        match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--json" => options.json = true,
            "--target" => {
                let raw = value("--target")?;
                options.target = Some(match raw.parse::<f64>() {
                    Ok(hz) if hz > 0.0 => TargetSpec::Hz(hz),
                    Ok(_) => bail!("--target must be positive"),
                    Err(_) => TargetSpec::Note(raw),
                });
            }
            "--string" => {
                let n: usize = value("--string")?
                    .parse()
                    .context("--string takes a number from 1 to 6")?;
                if !(1..=6).contains(&n) {
                    bail!("--string takes a number from 1 to 6");
                }
                options.target = Some(TargetSpec::GuitarString(n));
            }
            "--simulate" => {
                let freqs = value("--simulate")?
                    .split(',')
                    .map(|f| f.trim().parse::<f64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("--simulate takes comma-separated frequencies in Hz")?;
                options.simulate = Some(freqs);
            }
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--cycles" => {
                options.cycles = Some(value("--cycles")?.parse().context("--cycles takes a count")?)
            }
            other => bail!("unknown option {other:?}\n\n{USAGE}"),
        }
    }

    if options.mode == Mode::Chords && options.target.is_some() {
        bail!("--target and --string only apply to the tuner");
    }
    Ok(Command::Run(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Result<Options> {
        match parse(args.iter().map(|s| s.to_string()))? {
            Command::Run(options) => Ok(options),
            Command::Help => Err(anyhow!("unexpected help")),
        }
    }

    #[test]
    fn tuner_with_note_target() {
        let options = run(&["tuner", "--target", "A2", "--json"]).unwrap();
        assert_eq!(options.mode, Mode::Tuner);
        assert_eq!(options.target, Some(TargetSpec::Note("A2".into())));
        assert!(options.json);
        let hz = options.target.unwrap().resolve(440.0).unwrap();
        assert!((hz - 110.0).abs() < 1e-9);
    }

    #[test]
    fn numeric_target_and_string() {
        let options = run(&["tuner", "--target", "82.41"]).unwrap();
        assert_eq!(options.target, Some(TargetSpec::Hz(82.41)));

        let options = run(&["tuner", "--string", "6"]).unwrap();
        let hz = options.target.unwrap().resolve(440.0).unwrap();
        assert!((hz - 82.4069).abs() < 1e-3);

        assert!(run(&["tuner", "--string", "7"]).is_err());
        assert!(run(&["tuner", "--target", "-3"]).is_err());
    }

    #[test]
    fn chords_with_simulation() {
        let options = run(&["chords", "--simulate", "261.63, 329.63,392", "--cycles", "3"]).unwrap();
        assert_eq!(options.mode, Mode::Chords);
        assert_eq!(options.simulate, Some(vec![261.63, 329.63, 392.0]));
        assert_eq!(options.cycles, Some(3));
        assert!(run(&["chords", "--target", "110"]).is_err());
    }

    #[test]
    fn errors_and_help() {
        assert!(run(&[]).is_err());
        assert!(run(&["metronome"]).is_err());
        assert!(run(&["tuner", "--cycles"]).is_err());
        assert!(run(&["tuner", "--bogus"]).is_err());
        assert_eq!(parse(vec!["--help".to_string()]).unwrap(), Command::Help);
        assert_eq!(
            parse(vec!["chords".to_string(), "-h".to_string()]).unwrap(),
            Command::Help
        );
    }
}
