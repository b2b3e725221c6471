//! AgentFleet CLI
//!
//! The `agentfleet` command runs competing implementation approaches against
//! one evaluation plan and ranks them.
//!
//! ## Commands
//!
//! - `run`: Run a tournament and print the ranked summary
//! - `validate-plan`: Check a plan's weights and tests
//! - `show`: Print the summary of a stored tournament artifact

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use agentfleet_core::telemetry::{init_tracing, level_for_verbosity};
use agentfleet_core::{
    read_tournament_artifact, render_plan_md, render_summary_md, resolve_repo, save_winner,
    write_tournament_artifact, ChannelEventSink, CommandImplementer, DecisionResolver,
    DirectoryWorkspaces, FleetConfig, FleetEvent, GitWorktreeWorkspaces, Mode, PendingDecision,
    Plan, PlanFields, ProcessEvaluator, Tournament, WorkspaceProvider,
};

const MIN_APPROACHES: usize = 2;
const MAX_APPROACHES: usize = 5;

#[derive(Parser)]
#[command(name = "agentfleet")]
#[command(author = "Stevedores Org")]
#[command(version = agentfleet_core::VERSION)]
#[command(about = "Run competing implementation approaches against one blind plan", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tournament
    Run {
        /// Plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Approach to compete (repeat 2-5 times)
        #[arg(short, long = "approach", required = true)]
        approaches: Vec<String>,

        /// Command that drafts candidates (JSON request on stdin, JSON reply on stdout)
        #[arg(long, env = "AGENTFLEET_IMPLEMENTER")]
        implementer: String,

        /// Interpreter for the plan's evaluator script
        #[arg(long)]
        evaluator: Option<String>,

        /// Pause on blocking decisions and ask on stdin
        #[arg(short, long)]
        interactive: bool,

        /// Iteration budget per approach
        #[arg(long)]
        max_iter: Option<u32>,

        /// Global timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Root for workspaces, clones and artifacts
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Git repository (path or URL); each approach gets its own worktree
        #[arg(long)]
        repo: Option<String>,

        /// Write the winner's code to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for tournament artifacts (default: <work-dir>/tournaments)
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Validate a plan file and print it
    ValidatePlan {
        /// Plan file (JSON)
        plan: PathBuf,
    },

    /// Show a stored tournament
    Show {
        /// Tournament ID
        tournament_id: String,

        /// Directory holding tournament artifacts (default: <work-dir>/tournaments)
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Run {
            plan,
            approaches,
            implementer,
            evaluator,
            interactive,
            max_iter,
            timeout,
            work_dir,
            repo,
            output,
            artifacts,
        } => {
            let mut config = FleetConfig::from_env();
            if let Some(max_iter) = max_iter {
                config = config.with_max_iterations(max_iter);
            }
            if let Some(timeout) = timeout {
                config = config.with_timeout(Some(Duration::from_secs(timeout)));
            }
            if let Some(work_dir) = work_dir {
                config = config.with_work_dir(work_dir);
            }
            if let Some(evaluator) = evaluator {
                config = config.with_interpreter(&evaluator);
            }
            let opts = RunOptions {
                plan,
                approaches,
                implementer,
                interactive,
                repo,
                output,
                artifacts,
            };
            cmd_run(config, opts).await
        }
        Commands::ValidatePlan { plan } => cmd_validate_plan(&plan),
        Commands::Show {
            tournament_id,
            artifacts,
        } => {
            let dir = artifacts.unwrap_or_else(|| FleetConfig::from_env().artifacts_dir());
            cmd_show(&tournament_id, &dir)
        }
    }
}

struct RunOptions {
    plan: PathBuf,
    approaches: Vec<String>,
    implementer: String,
    interactive: bool,
    repo: Option<String>,
    output: Option<PathBuf>,
    artifacts: Option<PathBuf>,
}

fn check_approach_count(approaches: &[String]) -> Result<()> {
    if !(MIN_APPROACHES..=MAX_APPROACHES).contains(&approaches.len()) {
        bail!(
            "expected {MIN_APPROACHES}-{MAX_APPROACHES} approaches, got {}",
            approaches.len()
        );
    }
    Ok(())
}

fn load_plan(path: &Path) -> Result<Plan> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let fields: PlanFields =
        serde_json::from_str(&raw).with_context(|| format!("parse plan {:?}", path))?;
    Plan::new(fields).with_context(|| format!("invalid plan {:?}", path))
}

/// Run a tournament
async fn cmd_run(config: FleetConfig, opts: RunOptions) -> Result<()> {
    check_approach_count(&opts.approaches)?;
    let plan = load_plan(&opts.plan)?;

    let implementer = CommandImplementer::from_command_line(&opts.implementer, config.implementer_timeout)
        .context("implementer command is empty")?;
    let evaluator = ProcessEvaluator::new(config.interpreter.clone(), config.eval_timeout);

    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("create work dir {:?}", config.work_dir))?;
    let workspaces: Arc<dyn WorkspaceProvider> = match &opts.repo {
        Some(repo) => {
            let repo_path = resolve_repo(repo, &config.work_dir)
                .await
                .with_context(|| format!("resolve repository {repo}"))?;
            info!(repo = %repo_path.display(), "using git worktrees");
            Arc::new(GitWorktreeWorkspaces::new(repo_path, config.agents_dir()))
        }
        None => Arc::new(DirectoryWorkspaces::new(config.agents_dir())),
    };

    let (sink, events) = ChannelEventSink::channel();
    let printer = tokio::spawn(print_progress(events));

    let mode = if opts.interactive {
        Mode::Interactive
    } else {
        Mode::Speculative
    };
    let mut tournament = Tournament::new(Arc::new(implementer), Arc::new(evaluator), workspaces)
        .with_events(Arc::new(sink));
    if opts.interactive {
        tournament = tournament.with_resolver(Arc::new(StdinResolver::new()));
    }

    eprintln!(
        "Running {} approaches (max {} iterations, {:?} mode)",
        opts.approaches.len(),
        config.max_iterations,
        mode
    );
    let result = tournament
        .run(plan, &opts.approaches, &config.tournament_config(mode))
        .await
        .context("tournament failed")?;
    drop(tournament);
    let _ = printer.await;

    let artifacts_dir = opts.artifacts.unwrap_or_else(|| config.artifacts_dir());
    let artifact = write_tournament_artifact(&result, &artifacts_dir)
        .with_context(|| format!("write tournament artifact under {:?}", artifacts_dir))?;

    println!("{}", render_summary_md(&result));
    eprintln!("Tournament artifact: {}", artifact.display());

    if let Some(output) = &opts.output {
        if save_winner(&result, output).with_context(|| format!("write {:?}", output))? {
            eprintln!("Winner's code saved to {}", output.display());
        } else {
            eprintln!("No winner; nothing written to {}", output.display());
        }
    }
    Ok(())
}

/// Validate a plan file and print it
fn cmd_validate_plan(path: &Path) -> Result<()> {
    let plan = load_plan(path)?;
    println!("{}", render_plan_md(&plan));
    println!("Plan is valid: {} tests across {} weighted categories.", plan.test_count(), plan.weights().len());
    Ok(())
}

/// Show a stored tournament
fn cmd_show(tournament_id: &str, dir: &Path) -> Result<()> {
    let result = read_tournament_artifact(tournament_id, dir)
        .with_context(|| format!("read tournament {tournament_id} from {:?}", dir))?;
    println!("{}", render_summary_md(&result));
    Ok(())
}

/// One progress line per event, on stderr.
async fn print_progress(mut events: mpsc::UnboundedReceiver<FleetEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            FleetEvent::IterationCompleted { approach, iteration } => eprintln!(
                "[{approach}] attempt {}: {}/{} tests passed",
                iteration.attempt,
                iteration.tests_passed,
                iteration.total_tests()
            ),
            FleetEvent::DecisionRecorded { approach, decision } => {
                eprintln!("[{approach}] decision {decision}")
            }
            FleetEvent::AgentTerminated { approach, result } => eprintln!(
                "[{approach}] {} after {} iteration(s): {}",
                if result.success { "PASSED" } else { "FAILED" },
                result.iteration_count(),
                result.termination
            ),
            FleetEvent::TournamentCompleted { winner, .. } => {
                eprintln!("Tournament complete; winner: {}", winner.as_deref().unwrap_or("none"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Interactive resolution
// ---------------------------------------------------------------------------

/// Interpret one line of user input against `options`.
///
/// Empty input accepts `suggestion`; a 1-based number or an exact option
/// name picks that option. Anything else is `None`.
fn parse_choice(input: &str, options: &[String], suggestion: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return Some(suggestion.to_string());
    }
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| options.get(i)).cloned();
    }
    options.iter().find(|o| o.as_str() == input).cloned()
}

/// Prompts on stderr and reads answers from stdin, one decision at a time.
///
/// Lines are read on a dedicated thread so a pending read never holds up
/// runtime shutdown.
struct StdinResolver {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl StdinResolver {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl DecisionResolver for StdinResolver {
    async fn resolve(&self, pending: &PendingDecision) -> String {
        let decision = &pending.decision;
        eprintln!("\n[{}] BLOCKING decision #{}", pending.approach, decision.sequence);
        eprintln!("  {}", decision.question);
        for (i, option) in decision.options.iter().enumerate() {
            let marker = if *option == decision.chosen { " (suggested)" } else { "" };
            eprintln!("  {}. {option}{marker}", i + 1);
        }
        if !decision.reasoning.is_empty() {
            eprintln!("  reasoning: {}", decision.reasoning);
        }

        let mut lines = self.lines.lock().await;
        loop {
            eprint!("Choice [Enter accepts suggestion]: ");
            match lines.recv().await {
                Some(line) => {
                    if let Some(choice) = parse_choice(&line, &decision.options, &decision.chosen) {
                        return choice;
                    }
                    eprintln!("  not an option; enter 1-{}", decision.options.len());
                }
                // stdin closed
                None => return decision.chosen.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec!["per-user".to_string(), "global".to_string()]
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("", &options(), "per-user").as_deref(), Some("per-user"));
        assert_eq!(parse_choice(" 2 ", &options(), "per-user").as_deref(), Some("global"));
        assert_eq!(parse_choice("global", &options(), "per-user").as_deref(), Some("global"));
        assert_eq!(parse_choice("0", &options(), "per-user"), None);
        assert_eq!(parse_choice("3", &options(), "per-user"), None);
        assert_eq!(parse_choice("per-tenant", &options(), "per-user"), None);
    }

    #[test]
    fn test_approach_count_bounds() {
        let names = |n: usize| (0..n).map(|i| format!("a{i}")).collect::<Vec<_>>();
        assert!(check_approach_count(&names(1)).is_err());
        assert!(check_approach_count(&names(2)).is_ok());
        assert!(check_approach_count(&names(5)).is_ok());
        assert!(check_approach_count(&names(6)).is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "agentfleet",
            "-vv",
            "run",
            "--plan",
            "plan.json",
            "-a",
            "Token bucket",
            "-a",
            "Sliding window",
            "--implementer",
            "python3 agent.py",
            "--interactive",
            "--max-iter",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                approaches,
                interactive,
                max_iter,
                ..
            } => {
                assert_eq!(approaches, vec!["Token bucket", "Sliding window"]);
                assert!(interactive);
                assert_eq!(max_iter, Some(3));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_load_plan_reports_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"resolved_task":"t","interface_contract":"c","tests":[{"name":"a","category":"correctness"}],"weights":{"correctness":90}}"#,
        )
        .unwrap();
        let err = load_plan(&path).unwrap_err();
        assert!(format!("{err:#}").contains("must sum to 100"));
    }
}
