//! nilm-engine entry point: CLI wiring, logging setup, and run dispatch.

use std::path::Path;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use nilm_engine::cli::{self, CliOptions};
use nilm_engine::config::EngineConfig;
use nilm_engine::io::export::export_csv;
use nilm_engine::io::replay::read_csv;
use nilm_engine::runner::{self, RunOutcome};

fn load_config(cli: &CliOptions) -> EngineConfig {
    // --config takes priority, then --preset (which defaults to "default")
    let loaded = if let Some(ref path) = cli.config {
        EngineConfig::from_toml_file(path)
    } else {
        EngineConfig::from_preset(cli.preset.as_deref().unwrap_or("default"))
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(hours) = cli.hours {
        config.trace.hours = hours;
    }
    if let Some(seed) = cli.seed {
        config.trace.seed = seed;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &CliOptions, config: &EngineConfig) -> RunOutcome {
    let outcome = match cli.input {
        Some(ref path) => read_csv(path)
            .map_err(nilm_engine::NilmError::from)
            .and_then(|rows| runner::run_replay(config, &rows)),
        None => runner::run_synthetic(config),
    };
    outcome.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    })
}

fn main() {
    let cli = cli::parse_args().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        cli::print_usage();
        process::exit(1);
    });
    let config = load_config(&cli);

    if cli.tui {
        #[cfg(feature = "tui")]
        {
            // a --config file shows up as "custom" and restarts from that file's settings
            let preset = cli.preset.clone().unwrap_or_else(|| "custom".to_string());
            if let Err(e) = nilm_engine::tui::run(config, &preset) {
                eprintln!("error: TUI crashed: {e}");
                process::exit(1);
            }
            return;
        }
        #[cfg(not(feature = "tui"))]
        {
            eprintln!("error: --tui requires building with `--features tui`");
            process::exit(1);
        }
    }

    init_tracing(&config.logging.level);

    let outcome = run(&cli, &config);
    println!("{}", outcome.report);

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&outcome.history, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        info!(path = %path.display(), rows = outcome.history.len(), "telemetry written");
    }

    if cli.serve {
        serve(outcome, cli.port);
    }
}

#[cfg(feature = "api")]
fn serve(outcome: RunOutcome, port: u16) {
    use std::net::SocketAddr;
    use std::sync::Arc;

    let state = Arc::new(nilm_engine::api::AppState::from(outcome));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });
    if let Err(e) = rt.block_on(nilm_engine::api::serve(state, addr)) {
        eprintln!("error: API server failed: {e}");
        process::exit(1);
    }
}

#[cfg(not(feature = "api"))]
fn serve(_outcome: RunOutcome, _port: u16) {
    eprintln!("error: --serve requires building with `--features api`");
    process::exit(1);
}
