//! # ctcbutton CLI
//!
//! Command-line interface for the causal-loop button experiment.
//!
//! Usage:
//!   ctcbutton run [--config FILE] [flags]
//!   ctcbutton parse <TEXT>...
//!   ctcbutton replay <experiment.json>
//!
//! Examples:
//!   DASHSCOPE_API_KEY=sk-... ctcbutton run --max-rounds 12
//!   ctcbutton run --config ctcbutton.toml --seed 7
//!   ctcbutton parse 'I will press. {"action": 1}'
//!   ctcbutton replay .ctcbutton/experiment.json

mod config;

use clap::{Parser, Subcommand};
use config::{parse_policy, parse_state, CliConfig, Overrides};
use ctcbutton_agent::{
    map_provider_error, CancelHandle, Experiment, ExperimentEvent, ProviderAgent, UnparseablePolicy,
};
use ctcbutton_core::{
    parse_action_detailed, AttemptOutcome, DeviceState, FileSink, OpenAIProvider, Snapshot,
    UniformSampler,
};
use ctcbutton_error::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ctcbutton")]
#[command(author, version, about = "ctcbutton - does the button light up before you decide?")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log progress at info level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only print the final outcome
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment against the configured model
    Run {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Accepted rounds before the run ends
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Button state at round 0 (0 or 1)
        #[arg(long, value_parser = parse_state)]
        initial_state: Option<DeviceState>,

        /// What to do with replies that carry no action (stop|retry)
        #[arg(long, value_parser = parse_policy)]
        on_unparseable: Option<UnparseablePolicy>,

        /// Model for the early rounds
        #[arg(long)]
        model: Option<String>,

        /// Model from the switch round onwards
        #[arg(long)]
        late_model: Option<String>,

        /// OpenAI-compatible endpoint
        #[arg(long)]
        base_url: Option<String>,

        /// Seed for the state sampler
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for experiment.json and messages.json
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Run the action parser on a piece of text
    Parse {
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Print a saved experiment.json
    Replay {
        /// Path to experiment.json
        #[arg(required = true)]
        file: PathBuf,

        /// Also print every reply in the transcript
        #[arg(short, long)]
        full: bool,
    },
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}…", head)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn describe_outcome(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Accepted => "accepted".to_string(),
        AttemptOutcome::Rejected { corrective } => format!("rejected, state -> {}", corrective),
        AttemptOutcome::Stopped => "stopped".to_string(),
        AttemptOutcome::Unparseable => "unparseable".to_string(),
    }
}

fn print_event(event: &ExperimentEvent) {
    match event {
        ExperimentEvent::RoundStarted { round, attempt, shown } => {
            if *attempt == 1 {
                println!("Round {} - button {}", round, shown);
            } else {
                println!("Round {} (attempt {}) - button {}", round, attempt, shown);
            }
        }
        ExperimentEvent::AgentReplied { reply, .. } => {
            println!("   Reply: {}", truncate(reply.trim(), 160));
        }
        ExperimentEvent::Accepted {
            decision, next_state, ..
        } => {
            println!("   Accepted: {} (next button {})", decision, next_state);
        }
        ExperimentEvent::Violation {
            declared, corrective, ..
        } => {
            println!("   Violation: {} contradicts the light, rewriting to {}", declared, corrective);
        }
        ExperimentEvent::Unparseable { .. } => {
            println!("   No action found in reply");
        }
        ExperimentEvent::Stopped { round } => {
            println!("   Agent ended the experiment at round {}", round);
        }
        ExperimentEvent::Finished { .. } => {}
    }
}

async fn run_experiment(mut config: CliConfig, quiet: bool) -> Result<()> {
    let api_key = config.provider.api_key()?;
    let provider =
        OpenAIProvider::new(config.provider.provider_config(api_key)).map_err(map_provider_error)?;

    let mut agent = ProviderAgent::new(provider).with_schedule(config.provider.schedule());
    if let Some(temperature) = config.provider.temperature {
        agent = agent.with_temperature(temperature);
    }

    let sampler = match config.seed.take() {
        Some(seed) => UniformSampler::seeded(seed),
        None => UniformSampler::new(),
    };

    let sink = FileSink::new(&config.log_dir)?;
    let experiment_path = sink.experiment_path();

    let cancel = CancelHandle::new();
    let mut experiment = Experiment::new(config.experiment.clone(), agent, sampler)?
        .with_retry_policy(config.retry.policy())
        .with_sink(sink)
        .with_cancel_handle(cancel.clone())
        .with_observer(move |event| {
            if !quiet {
                print_event(event);
            }
        });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current round");
            cancel.cancel();
        }
    });

    let result = experiment.run().await;

    if !quiet {
        println!("\nTimeline: {}", experiment.ledger().timeline());
        let usage = experiment.agent().usage();
        println!(
            "Calls: {}, tokens: {} prompt / {} completion, truncated replies: {}",
            usage.total_calls,
            usage.total_prompt_tokens,
            usage.total_completion_tokens,
            experiment.agent().truncated_replies()
        );
        println!("Log: {}", experiment_path.display());
    }

    let outcome = result?;
    println!("Finished: {}", outcome);
    Ok(())
}

fn parse_text(text: &str) {
    match parse_action_detailed(text) {
        Some((action, pass)) => {
            let code = action.code().map(|c| c.to_string()).unwrap_or_default();
            println!("{} (action {}, {:?} match)", action, code, pass);
        }
        None => println!("unparseable"),
    }
}

fn replay(file: &Path, full: bool) -> Result<()> {
    let snapshot = Snapshot::load(file)?;
    let ledger = snapshot.ledger()?;

    println!("Snapshot: {:?} at round {}", snapshot.trigger, snapshot.round);
    println!("Timeline: {}", ledger.timeline());
    println!("{}", ledger.render());
    println!("\nTranscript ({} attempts):", snapshot.transcript.len());
    for entry in &snapshot.transcript {
        println!(
            "  r{}.{} shown {} -> {}",
            entry.round,
            entry.attempt,
            entry.shown_state,
            describe_outcome(&entry.outcome)
        );
        if full {
            if let Some(reasoning) = &entry.reasoning {
                println!("      Reasoning: {}", truncate(reasoning.trim(), 400));
            }
            println!("      Reply: {}", entry.reply.trim());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            max_rounds,
            initial_state,
            on_unparseable,
            model,
            late_model,
            base_url,
            seed,
            log_dir,
        } => {
            let overrides = Overrides {
                max_rounds,
                initial_state,
                on_unparseable,
                model,
                late_model,
                base_url,
                seed,
                log_dir,
            };
            match CliConfig::resolve(config.as_deref()) {
                Ok(mut resolved) => {
                    overrides.apply(&mut resolved);
                    if !cli.quiet {
                        println!("ctcbutton - causal-loop button experiment\n");
                    }
                    run_experiment(resolved, cli.quiet).await
                }
                Err(e) => Err(e),
            }
        }
        Commands::Parse { text } => {
            parse_text(&text.join(" "));
            Ok(())
        }
        Commands::Replay { file, full } => replay(&file, full),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
