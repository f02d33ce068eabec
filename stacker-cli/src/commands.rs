//! Subcommand arguments and execution.

use anyhow::{bail, Context, Result};
use clap::Args;
use stacker::actions::ActionKind;
use stacker::blueprint::FileBlueprints;
use stacker::cancellation::CancellationToken;
use stacker::config::{Config, Environment};
use stacker::confirm::TerminalConfirmer;
use stacker::context::RunContext;
use stacker::events::{ConsoleEventSink, EventSink, FanoutEventSink, LoggingEventSink};
use stacker::executor::{Orchestrator, RunReport};
use stacker::hooks::CommandHookRunner;
use stacker::options::RunOptions;
use stacker::provider::LocalProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Environment files and the configuration, plus `-e` overrides.
#[derive(Debug, Clone, Args)]
pub struct Inputs {
    /// Environment files followed by the configuration file
    #[arg(value_name = "FILES", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Environment override, repeatable
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

impl Inputs {
    /// Splits the positional files into environment files and the config.
    pub fn split(&self) -> Result<(&[PathBuf], &Path)> {
        match self.files.split_last() {
            Some((config, env_files)) => Ok((env_files, config.as_path())),
            None => bail!("a configuration file is required"),
        }
    }

    /// Merges environment files left to right, then applies overrides.
    pub fn environment(&self) -> Result<Environment> {
        let (env_files, _) = self.split()?;
        let mut environment = Environment::new();
        for path in env_files {
            let file = Environment::load(path)
                .with_context(|| format!("failed to load environment file {}", path.display()))?;
            environment.merge(file);
        }
        environment
            .apply_overrides(&self.overrides)
            .context("invalid -e override")?;
        Ok(environment)
    }

    /// Loads the configuration file.
    pub fn config(&self) -> Result<Config> {
        let (_, path) = self.split()?;
        Config::load(path).with_context(|| format!("failed to load configuration {}", path.display()))
    }
}

/// Arguments of `stacker build`.
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub inputs: Inputs,

    /// Confirm every update on the terminal
    #[arg(short, long)]
    pub interactive: bool,

    /// Replace rather than patch modified resources
    #[arg(long)]
    pub replacements_only: bool,

    /// Write rendered templates to this directory
    #[arg(short, long, value_name = "DIR")]
    pub dump: Option<PathBuf>,

    /// Allow updating a protected stack, repeatable
    #[arg(long, value_name = "STACK")]
    pub force: Vec<String>,

    /// Print the execution plan and exit
    #[arg(long)]
    pub outline: bool,

    /// Maximum number of stacks processed at once
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,
}

/// Arguments of `stacker destroy`.
#[derive(Debug, Clone, Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub inputs: Inputs,

    /// Destroy without asking
    #[arg(long)]
    pub force: bool,

    /// Confirm every destroy on the terminal
    #[arg(short, long)]
    pub interactive: bool,
}

/// Arguments of `stacker diff`.
#[derive(Debug, Clone, Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub inputs: Inputs,
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the local provider keeps stack state.
    pub state_dir: PathBuf,
    /// Provider call timeout in seconds.
    pub provider_timeout: f64,
    /// `-v` count. Any verbosity also logs status events.
    pub verbose: u8,
}

/// Runs `stacker build`.
///
/// Build hooks run around the build, but not for `--outline` or `--dump`.
pub async fn build(args: BuildArgs, settings: &Settings) -> Result<i32> {
    let mut options = RunOptions::new()
        .with_interactive(args.interactive)
        .with_replacements_only(args.replacements_only)
        .with_provider_timeout(settings.provider_timeout);
    for stack in &args.force {
        options = options.with_forced_stack(stack.as_str());
    }
    if let Some(max_parallel) = args.max_parallel {
        options = options.with_max_parallel(max_parallel);
    }
    if let Some(dir) = &args.dump {
        options = options.with_dump_dir(dir);
    }

    let orchestrator = prepare(&args.inputs, options, settings)?;
    if args.outline {
        print!("{}", orchestrator.outline(ActionKind::Build));
        return Ok(0);
    }
    let report = run(&orchestrator, ActionKind::Build).await?;
    Ok(report.exit_code())
}

/// Runs `stacker destroy`.
pub async fn destroy(args: DestroyArgs, settings: &Settings) -> Result<i32> {
    let options = RunOptions::new()
        .with_interactive(args.interactive)
        .with_force_all(args.force)
        .with_provider_timeout(settings.provider_timeout);
    let orchestrator = prepare(&args.inputs, options, settings)?;

    if !args.force && !args.interactive {
        println!("The following stacks would be destroyed:");
        print!("{}", orchestrator.outline(ActionKind::Destroy));
        println!("Rerun with --force or --interactive to destroy them.");
        return Ok(0);
    }
    let report = run(&orchestrator, ActionKind::Destroy).await?;
    Ok(report.exit_code())
}

/// Runs `stacker diff`.
pub async fn diff(args: DiffArgs, settings: &Settings) -> Result<i32> {
    let options = RunOptions::new().with_provider_timeout(settings.provider_timeout);
    let orchestrator = prepare(&args.inputs, options, settings)?;
    let report = run(&orchestrator, ActionKind::Diff).await?;
    print!("{}", render_diffs(&report));
    Ok(report.exit_code())
}

/// Loads inputs and wires the local provider, file blueprints, event
/// sink, hook runner and, when interactive, the terminal confirmer.
///
/// Blueprints and hook programs are resolved against the directory of the
/// configuration file.
fn prepare(inputs: &Inputs, options: RunOptions, settings: &Settings) -> Result<Orchestrator> {
    let environment = inputs.environment()?;
    let config = inputs.config()?;
    let (_, config_path) = inputs.split()?;
    let config_root = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    if options.interactive {
        info!("Using interactive AWS provider mode");
    } else {
        info!("Using default AWS provider mode");
    }

    let mut ctx = RunContext::new(
        Arc::new(LocalProvider::new(&settings.state_dir)),
        Arc::new(FileBlueprints::new(&config_root)),
    )
    .with_environment(environment)
    .with_sink(event_sink(settings.verbose))
    .with_hook_runner(Arc::new(CommandHookRunner::new(config_root)));
    if options.interactive {
        ctx = ctx.with_confirmer(Arc::new(TerminalConfirmer::new()));
    }
    let ctx = ctx.with_options(options);

    Ok(Orchestrator::from_config(&config, ctx)?)
}

/// Status lines on stdout, mirrored to the log when verbose.
fn event_sink(verbose: u8) -> Arc<dyn EventSink> {
    let console: Arc<dyn EventSink> = Arc::new(ConsoleEventSink::stdout());
    if verbose == 0 {
        return console;
    }
    Arc::new(
        FanoutEventSink::new()
            .with_sink(console)
            .with_sink(Arc::new(LoggingEventSink::debug())),
    )
}

/// Executes with Ctrl-C wired to cancellation.
async fn run(orchestrator: &Orchestrator, kind: ActionKind) -> Result<RunReport> {
    let token = Arc::clone(orchestrator.context().cancellation());
    let interrupt = tokio::spawn(cancel_on_interrupt(token));
    let result = orchestrator.execute(kind).await;
    interrupt.abort();

    let report = result?;
    if report.cancelled {
        warn!("Run interrupted; stacks not yet started were cancelled");
    }
    Ok(report)
}

async fn cancel_on_interrupt(token: Arc<CancellationToken>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        token.cancel("interrupted by operator");
    }
}

/// Renders each stack's planned changes under its name.
pub fn render_diffs(report: &RunReport) -> String {
    let mut out = String::new();
    for stack in &report.stacks {
        let Some(diff) = stack.diff.as_ref().filter(|d| !d.is_empty()) else {
            continue;
        };
        out.push_str(&format!("{}:\n", stack.fqn));
        for line in diff.lines() {
            out.push_str(&format!("    {line}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker::core::StackStatus;
    use stacker::executor::StackReport;
    use stacker::provider::{StackDiff, StackRequest};
    use std::collections::BTreeMap;

    fn inputs(files: &[&Path], overrides: &[&str]) -> Inputs {
        Inputs {
            files: files.iter().map(|p| p.to_path_buf()).collect(),
            overrides: overrides.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_last_file_is_config() {
        let args = inputs(&[Path::new("a.env"), Path::new("b.env"), Path::new("stacks.yaml")], &[]);
        let (env_files, config) = args.split().unwrap();
        assert_eq!(env_files, &[PathBuf::from("a.env"), PathBuf::from("b.env")]);
        assert_eq!(config, Path::new("stacks.yaml"));
    }

    #[test]
    fn test_environment_files_merge_left_to_right() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.env");
        let second = dir.path().join("second.env");
        std::fs::write(&first, "region: us-east-1\nsize: small\n").unwrap();
        std::fs::write(&second, "size: large\n").unwrap();

        let args = inputs(
            &[&first, &second, Path::new("stacks.yaml")],
            &["region=eu-west-1"],
        );
        let environment = args.environment().unwrap();
        assert_eq!(environment.get("size"), Some("large"));
        assert_eq!(environment.get("region"), Some("eu-west-1"));
    }

    #[test]
    fn test_bad_override_is_reported() {
        let args = inputs(&[Path::new("stacks.yaml")], &["novalue"]);
        assert!(args.environment().is_err());
    }

    struct Workspace {
        dir: tempfile::TempDir,
    }

    impl Workspace {
        /// One stack and a required `pre_build` hook that cannot run.
        fn with_broken_hook() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join("bucket.yaml"),
                "Resources:\n  Bucket:\n    Type: Bucket\n",
            )
            .unwrap();
            std::fs::write(
                dir.path().join("stacks.yaml"),
                "namespace: ns\npre_build:\n  - path: ./hooks/missing\nstacks:\n  - name: logs\n    class_path: bucket.yaml\n",
            )
            .unwrap();
            Self { dir }
        }

        fn settings(&self) -> Settings {
            Settings {
                state_dir: self.dir.path().join("state"),
                provider_timeout: 30.0,
                verbose: 1,
            }
        }

        fn build_args(&self) -> BuildArgs {
            BuildArgs {
                inputs: inputs(&[&self.dir.path().join("stacks.yaml")], &[]),
                interactive: false,
                replacements_only: false,
                dump: None,
                force: Vec::new(),
                outline: false,
                max_parallel: None,
            }
        }

        fn state_of(&self, fqn: &str) -> PathBuf {
            self.dir.path().join("state").join(format!("{fqn}.json"))
        }
    }

    #[tokio::test]
    async fn test_build_runs_pre_build_hooks() {
        let workspace = Workspace::with_broken_hook();

        let err = build(workspace.build_args(), &workspace.settings())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("pre_build hook ./hooks/missing failed"));
        assert!(!workspace.state_of("ns-logs").exists());
    }

    #[tokio::test]
    async fn test_outline_and_dump_skip_hooks() {
        let workspace = Workspace::with_broken_hook();

        let outline = BuildArgs {
            outline: true,
            ..workspace.build_args()
        };
        assert_eq!(build(outline, &workspace.settings()).await.unwrap(), 0);
        assert!(!workspace.state_of("ns-logs").exists());

        let dump_dir = workspace.dir.path().join("rendered");
        let dump = BuildArgs {
            dump: Some(dump_dir.clone()),
            ..workspace.build_args()
        };
        assert_eq!(build(dump, &workspace.settings()).await.unwrap(), 0);
        assert!(dump_dir.join("ns-logs.json").exists());
        assert!(workspace.state_of("ns-logs").exists());
    }

    #[test]
    fn test_render_diffs_skips_unchanged() {
        let request = StackRequest::new(
            "ns-app",
            serde_json::json!({"Resources": {"Web": {"Type": "Server"}}}),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let report = RunReport {
            run_id: uuid::Uuid::nil(),
            action: ActionKind::Diff,
            stacks: vec![
                StackReport {
                    name: "app".to_string(),
                    fqn: "ns-app".to_string(),
                    status: StackStatus::complete("would create new stack"),
                    diff: Some(StackDiff::creation(&request)),
                },
                StackReport {
                    name: "db".to_string(),
                    fqn: "ns-db".to_string(),
                    status: StackStatus::skipped("nochange"),
                    diff: Some(StackDiff::default()),
                },
            ],
            duration_ms: 1.0,
            cancelled: false,
        };

        assert_eq!(render_diffs(&report), "ns-app:\n    + Resources.Web\n");
    }
}
