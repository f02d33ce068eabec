//! Stacker CLI - build, destroy and diff infrastructure stacks
//!
//! Positional arguments are environment files followed by the
//! configuration file. Stack state is kept by the local provider under
//! `--state-dir`; templates are read relative to the configuration file.

use clap::{Parser, Subcommand};
use stacker::observability::{init_tracing, LogFormat};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::{BuildArgs, DestroyArgs, DiffArgs, Settings};

/// Stacker CLI application
#[derive(Debug, Parser)]
#[command(name = "stacker")]
#[command(about = "Dependency-aware orchestration of infrastructure stacks", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding local stack state
    #[arg(long, global = true, env = "STACKER_STATE_DIR", default_value = ".stacker")]
    state_dir: PathBuf,

    /// Timeout for each provider call, in seconds
    #[arg(long, global = true, default_value_t = 600.0)]
    provider_timeout: f64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update every stack in dependency order
    Build(BuildArgs),

    /// Destroy every stack in reverse dependency order
    Destroy(DestroyArgs),

    /// Show what a build would change
    Diff(DiffArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    let settings = Settings {
        state_dir: cli.state_dir,
        provider_timeout: cli.provider_timeout,
        verbose: cli.verbose,
    };
    let code = match cli.command {
        Commands::Build(args) => commands::build(args, &settings).await?,
        Commands::Destroy(args) => commands::destroy(args, &settings).await?,
        Commands::Diff(args) => commands::diff(args, &settings).await?,
    };
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "stacker", "-vv", "build", "-i", "--replacements-only", "-d", "out",
            "-e", "size=large", "--force", "db", "prod.env", "stacks.yaml",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert!(args.interactive);
        assert!(args.replacements_only);
        assert_eq!(args.dump, Some(PathBuf::from("out")));
        assert_eq!(args.force, vec!["db"]);
        assert_eq!(args.inputs.overrides, vec!["size=large"]);
        assert_eq!(
            args.inputs.files,
            vec![PathBuf::from("prod.env"), PathBuf::from("stacks.yaml")]
        );
    }

    #[test]
    fn test_destroy_force_and_log_format() {
        let cli = Cli::try_parse_from([
            "stacker", "--log-format", "json", "destroy", "--force", "stacks.yaml",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Destroy(args) = cli.command else {
            panic!("expected destroy");
        };
        assert!(args.force);
        assert!(!args.interactive);
    }

    #[test]
    fn test_config_file_required() {
        assert!(Cli::try_parse_from(["stacker", "diff"]).is_err());
    }
}
