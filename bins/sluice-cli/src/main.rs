//! sluice-cli: replay escrow scenarios and inspect configuration.
//!
//! `run` loads a JSON script (see [`script`]) and replays it against an
//! in-memory escrow, printing one JSON line per step and a summary line.
//! `show-config` prints the effective configuration after file and
//! environment overrides.

mod script;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

/// Sluice escrow scenario runner.
#[derive(Parser, Debug)]
#[command(name = "sluice-cli", version, about = "Time-locked escrow scenario runner")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON scenario script.
    Run(RunArgs),
    /// Print the effective escrow configuration as JSON.
    ShowConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the script file.
    script: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Exit with an error if any step failed.
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file (TOML, JSON, YAML, ...). `SLUICE_*` variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::ShowConfig(args) => show_config(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = settings::load(args.config.config.as_deref())?;
    let script = script::load(&args.script)?;
    info!(script = %args.script.display(), "loaded script");

    let mut write_err = None;
    let summary = script::run(&script, config, |outcome| {
        if write_err.is_some() {
            return;
        }
        match serde_json::to_string(&outcome) {
            Ok(line) => println!("{line}"),
            Err(e) => write_err = Some(e),
        }
    })?;
    if let Some(e) = write_err {
        return Err(e).context("failed to encode step outcome");
    }
    println!(
        "{}",
        serde_json::to_string(&summary).context("failed to encode summary")?
    );

    if args.strict && summary.failed > 0 {
        anyhow::bail!("{} of {} steps failed", summary.failed, summary.steps);
    }
    Ok(())
}

fn show_config(args: ConfigArgs) -> Result<()> {
    let config = settings::load(args.config.as_deref())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("failed to encode config")?
    );
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout stays machine-readable. Pass `format =
/// "json"` for structured output; any other value gives human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_config() {
        let cli = Cli::parse_from(["sluice-cli", "run", "s.json", "--config", "c.toml", "--strict"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.script, PathBuf::from("s.json"));
                assert_eq!(args.config.config, Some(PathBuf::from("c.toml")));
                assert!(args.strict);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_flags_are_global() {
        let cli = Cli::parse_from(["sluice-cli", "show-config", "--log-format", "json"]);
        assert_eq!(cli.log_format, "json");
        assert!(matches!(cli.command, Commands::ShowConfig(_)));
    }
}
