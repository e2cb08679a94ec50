//! Command-line parsing for the `nilm-engine` binary.

use std::env;
use std::path::PathBuf;

/// Default port for `--serve`.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub input: Option<PathBuf>,
    pub hours: Option<u32>,
    pub seed: Option<u64>,
    pub telemetry_out: Option<PathBuf>,
    pub serve: bool,
    pub port: u16,
    pub tui: bool,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut config = None;
    let mut preset = None;
    let mut input = None;
    let mut hours = None;
    let mut seed = None;
    let mut telemetry_out = None;
    let mut serve = false;
    let mut port = DEFAULT_PORT;
    let mut tui = false;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--input" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --input (expected a CSV file path)")?;
                if input.replace(PathBuf::from(path)).is_some() {
                    return Err("--input provided more than once".to_string());
                }
            }
            "--hours" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --hours (expected a positive integer)")?;
                let h = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|h| *h > 0)
                    .ok_or_else(|| format!("--hours value \"{raw}\" is not a positive integer"))?;
                hours = Some(h);
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let s = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                seed = Some(s);
            }
            "--telemetry-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --telemetry-out (expected a file path)")?;
                if telemetry_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--telemetry-out provided more than once".to_string());
                }
            }
            "--serve" => serve = true,
            "--port" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --port (expected a u16)")?;
                port = raw
                    .parse::<u16>()
                    .map_err(|_| format!("--port value \"{raw}\" is not a valid u16"))?;
            }
            "--tui" => tui = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if config.is_some() && preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    if tui && (serve || input.is_some()) {
        return Err("`--tui` cannot be combined with `--serve` or `--input`".to_string());
    }

    if config.is_none() && preset.is_none() {
        preset = Some("default".to_string());
    }

    Ok(CliOptions {
        config,
        preset,
        input,
        hours,
        seed,
        telemetry_out,
        serve,
        port,
        tui,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("nilm-engine: appliance-level disaggregation of a household power meter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  nilm-engine [--config <path> | --preset <name>] [--input <csv>] [--hours <n>]"
    );
    eprintln!("              [--seed <u64>] [--telemetry-out <path>] [--serve] [--port <u16>] [--tui]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from a TOML file");
    eprintln!("  --preset <name>          Use a built-in preset (default, essentials, sensitive)");
    eprintln!("  --input <csv>            Replay `timestamp,watts[,device]` rows instead of a synthetic trace");
    eprintln!("  --hours <n>              Synthetic trace length in hours");
    eprintln!("  --seed <u64>             Synthetic trace seed");
    eprintln!("  --telemetry-out <path>   Export every device snapshot to CSV");
    eprintln!("  --serve                  Start the REST API after the run (feature `api`)");
    eprintln!("  --port <u16>             API port (default: {DEFAULT_PORT})");
    eprintln!("  --tui                    Live dashboard (feature `tui`)");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG, falling back to [logging].level.");
}
