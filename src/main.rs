use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratefold::config::{LogFormat, Settings};
use ratefold::ratelimit::{RateLimiter, RestrictionSet};
use ratefold::ManualClock;

/// Replay a timestamped event log against a restriction file.
///
/// Each input line is `<millis> <scope> <session>`. Blank lines and lines
/// starting with `#` are ignored. Timestamps must not decrease.
#[derive(Debug, Parser)]
#[command(name = "ratefold", version, about)]
struct Args {
    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restriction file; overrides `restrictions_path` from the settings
    #[arg(short, long)]
    restrictions: Option<PathBuf>,

    /// Fold levels per counter; overrides `limiter.depth`
    #[arg(long)]
    depth: Option<usize>,

    /// Output format for decisions
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Event log to replay; reads stdin when omitted
    input: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct Decision<'a> {
    time_ms: u64,
    scope: &'a str,
    session: &'a str,
    accepted: bool,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    accepted: u64,
    rejected: u64,
    counters: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(depth) = args.depth {
        settings.limiter.depth = depth;
    }
    init_tracing(&settings);

    let restrictions_path = args
        .restrictions
        .clone()
        .or_else(|| settings.restrictions_path.clone().map(PathBuf::from))
        .context("No restriction file given (use --restrictions or restrictions_path)")?;
    let restrictions = RestrictionSet::from_file(&restrictions_path)
        .with_context(|| format!("Failed to load {}", restrictions_path.display()))?;

    let clock = ManualClock::default();
    let limiter = RateLimiter::with_restrictions(settings.limiter.clone(), &restrictions, clock.clone())?;
    info!(depth = limiter.depth(), "Rate limiter initialized");

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = replay(reader, &limiter, &clock, args.output, &mut out)?;

    match args.output {
        OutputFormat::Text => writeln!(
            out,
            "accepted={} rejected={} counters={}",
            summary.accepted, summary.rejected, summary.counters
        )?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&summary)?)?,
    }

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        counters = summary.counters,
        "Replay finished"
    );
    Ok(())
}

fn replay(
    reader: Box<dyn BufRead>,
    limiter: &RateLimiter<ManualClock>,
    clock: &ManualClock,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    let mut last_ms = 0u64;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(time), Some(scope), Some(session), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            bail!("Line {}: expected '<millis> <scope> <session>'", line_no);
        };
        let time_ms: u64 = time
            .parse()
            .with_context(|| format!("Line {}: invalid timestamp '{}'", line_no, time))?;
        if time_ms < last_ms {
            bail!(
                "Line {}: timestamp {} is earlier than {}",
                line_no,
                time_ms,
                last_ms
            );
        }
        last_ms = time_ms;

        clock.set(Duration::from_millis(time_ms));
        let accepted = limiter
            .add_event(scope, session)
            .with_context(|| format!("Line {}", line_no))?;
        if accepted {
            summary.accepted += 1;
        } else {
            summary.rejected += 1;
        }

        match format {
            OutputFormat::Text => writeln!(
                out,
                "{} {} {} {}",
                time_ms,
                scope,
                session,
                if accepted { "accepted" } else { "rejected" }
            )?,
            OutputFormat::Json => {
                let decision = Decision {
                    time_ms,
                    scope,
                    session,
                    accepted,
                };
                writeln!(out, "{}", serde_json::to_string(&decision)?)?;
            }
        }
    }

    summary.counters = limiter.counter_count();
    Ok(summary)
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    match settings.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratefold::config::LimiterConfig;
    use std::io::Cursor;

    fn limiter() -> (RateLimiter<ManualClock>, ManualClock) {
        let yaml = r#"
restrictions:
  login:
    interval: 1s
    max_events: 2
"#;
        let set = RestrictionSet::from_yaml(yaml).unwrap();
        let clock = ManualClock::default();
        let limiter =
            RateLimiter::with_restrictions(LimiterConfig::default(), &set, clock.clone()).unwrap();
        (limiter, clock)
    }

    fn run(input: &str, format: OutputFormat) -> anyhow::Result<(Summary, String)> {
        let (limiter, clock) = limiter();
        let mut out = Vec::new();
        let reader: Box<dyn BufRead> = Box::new(Cursor::new(input.to_string()));
        let summary = replay(reader, &limiter, &clock, format, &mut out)?;
        Ok((summary, String::from_utf8(out).unwrap()))
    }

    #[test]
    fn test_replay_text_output() {
        let input = "# warmup\n0 login alice\n10 login alice\n\n20 login alice\n1500 login alice\n";
        let (summary, output) = run(input, OutputFormat::Text).unwrap();

        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.counters, 1);
        assert_eq!(
            output.lines().collect::<Vec<_>>(),
            vec![
                "0 login alice accepted",
                "10 login alice accepted",
                "20 login alice rejected",
                "1500 login alice accepted",
            ]
        );
    }

    #[test]
    fn test_replay_json_output() {
        let (_, output) = run("5 login bob\n", OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["time_ms"], 5);
        assert_eq!(value["session"], "bob");
        assert_eq!(value["accepted"], true);
    }

    #[test]
    fn test_replay_rejects_bad_input() {
        assert!(run("0 login\n", OutputFormat::Text).is_err());
        assert!(run("soon login alice\n", OutputFormat::Text).is_err());
        assert!(run("10 login alice\n5 login alice\n", OutputFormat::Text).is_err());
    }

    #[test]
    fn test_replay_unconfigured_scope_fails() {
        let err = run("0 upload alice\n", OutputFormat::Text).unwrap_err();
        assert!(format!("{:#}", err).contains("upload"));
    }
}
