use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

use cadre_core::config::Config;
use cadre_core::domain::WorkflowEvent;
use cadre_core::observability::StatusReport;
use cadre_core::ports::{AssumeYes, Confirmation};
use cadre_core::{ExecutionPlan, Orchestrator, Result, RunOutcome, RunReport, WorkflowError};

#[derive(Parser, Debug)]
#[command(name = "cadre", version, about = "Phased build-out orchestrator")]
struct Cli {
    /// Workflow configuration file
    #[arg(short, long, default_value = "cadre.yaml")]
    config: PathBuf,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full workflow
    Run {
        /// Print the resolved plan without dispatching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run only the teams of one phase
    Phase { phase: u32 },
    /// Continue from the persisted run state
    Resume {
        /// Restore a named checkpoint first
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// Treat every team up to and including TEAM as done, then run the rest
    ResumeFrom { team: String },
    /// Show progress
    Status,
    /// Keep only completed teams below PHASE
    Rollback { phase: u32 },
    /// Wipe all progress, checkpoints and history
    Reset {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// List checkpoint names
    Checkpoints,
}

/// Reads a yes/no answer from stdin.
struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = config
        .logging
        .console_output
        .then(|| fmt::layer().with_writer(io::stderr));

    let file = match config.log_file_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    registry().with(filter).with(console).with(file).init();
    Ok(())
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::TaskDispatched {
            team,
            phase,
            attempt,
        } => println!("-> {team} (phase {phase}, attempt {attempt})"),
        WorkflowEvent::TaskCompleted { team } => println!("ok {team}"),
        WorkflowEvent::TaskFailed { team, error } => println!("FAILED {team}: {error}"),
        WorkflowEvent::RetryScheduled {
            team,
            attempt,
            delay,
        } => println!("retry {team} (attempt {attempt}) in {delay:?}"),
        WorkflowEvent::TaskBlocked { team, cause } => println!("blocked {team} ({cause} failed)"),
        WorkflowEvent::CheckpointWritten { name } => println!("checkpoint {name}"),
        _ => {}
    }
}

fn print_plan(plan: &ExecutionPlan) {
    println!("Execution plan ({} tasks)", plan.tasks.len());
    for (phase, tasks) in plan.by_phase() {
        println!("\nPhase {phase}");
        for task in tasks {
            let deps = if task.dependencies.is_empty() {
                "-".to_string()
            } else {
                task.dependencies.join(", ")
            };
            let duration = task
                .duration_estimate
                .map(|h| format!("{h}h"))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {:<20} priority {:>2}  {:>5}  after: {deps}",
                task.id, task.priority, duration
            );
        }
    }

    println!("\nDispatch waves");
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("  {}: {}", i + 1, wave.join(", "));
    }
    if !plan.unresolved.is_empty() {
        println!("\nNever eligible: {}", plan.unresolved.join(", "));
    }
    println!("\nEstimated duration: {} hours", plan.estimated_hours());
}

fn print_report(report: &RunReport) {
    println!(
        "\n{} finished: {:?} in {:.1?}",
        report.run_id, report.state, report.duration
    );
    println!("  completed: {}", report.completed.len());
    for (team, error) in &report.failed {
        println!("  failed:    {team}: {error}");
    }
    if !report.blocked.is_empty() {
        println!("  blocked:   {}", report.blocked.join(", "));
    }
    if !report.not_started.is_empty() {
        println!("  not started: {}", report.not_started.join(", "));
    }
}

fn print_status(status: &StatusReport) {
    let counts = &status.counts;
    println!("Progress: {:.1}%", status.percent_complete);
    println!("  total:     {}", counts.total);
    println!("  completed: {}", counts.completed);
    println!("  running:   {}", counts.running);
    println!("  failed:    {}", counts.failed);
    println!("  pending:   {}", counts.pending);
    if let Some(phase) = status.current_phase {
        println!("  phase:     {phase}");
    }
    if let Some(update) = &status.last_update {
        println!("  updated:   {update}");
    }
    for (team, error) in &status.failures {
        println!("  ! {team}: {error}");
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), WorkflowError> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    init_logging(&config, cli.verbose)?;
    info!(
        project = %config.project.name,
        teams = config.teams.len(),
        "configuration loaded"
    );

    let orchestrator = Orchestrator::from_config(config)?;

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = match cli.command {
        Command::Run { dry_run } => match orchestrator.run(dry_run).await? {
            RunOutcome::Planned(plan) => {
                print_plan(&plan);
                None
            }
            RunOutcome::Finished(report) => Some(report),
        },
        Command::Phase { phase } => Some(orchestrator.run_phase(phase).await?),
        Command::Resume { checkpoint } => Some(orchestrator.resume(checkpoint.as_deref()).await?),
        Command::ResumeFrom { team } => Some(orchestrator.resume_from(&team).await?),
        Command::Status => {
            print_status(&orchestrator.status().await);
            None
        }
        Command::Rollback { phase } => {
            let kept = orchestrator.rollback_to_phase(phase).await?;
            println!("Rolled back to phase {phase}, {} teams remain completed", kept.len());
            None
        }
        Command::Reset { yes } => {
            if yes {
                orchestrator.full_reset(&AssumeYes).await?;
            } else {
                orchestrator.full_reset(&StdinConfirmation).await?;
            }
            println!("Run state wiped");
            None
        }
        Command::Checkpoints => {
            let names = orchestrator.checkpoints().await;
            if names.is_empty() {
                println!("No checkpoints");
            }
            for name in names {
                println!("{name}");
            }
            None
        }
    };

    // Dropping the orchestrator closes the event channel; the printer drains
    // what is left and stops.
    drop(orchestrator);
    if let Err(e) = printer.await {
        debug!(error = %e, "event printer stopped abnormally");
    }

    if let Some(report) = report {
        print_report(&report);
        report.into_result()?;
    }
    Ok(())
}
