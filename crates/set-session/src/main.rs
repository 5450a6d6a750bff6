//! Set Session CLI.
//!
//! Commands:
//! - run: Run a session with autonomous and/or stdin-driven players
//! - deal: Deal one board and list the sets on it

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use set_kernel::{find_sets, Card, MatchRule, PlayerKind, SessionBuilder, SessionConfig};
use set_session::driver::{spawn_stdin_reader, AutonomousDriver};
use set_session::policy::PolicyKind;
use set_session::results::{timestamped_path, RunResult};

#[derive(Parser)]
#[command(name = "set-session")]
#[command(version)]
#[command(about = "Timed multi-player set-matching sessions")]
struct Cli {
    /// Session configuration file (.toml or .json); defaults apply otherwise
    #[arg(long, env = "SET_SESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single session
    Run {
        /// Number of autonomous players
        #[arg(long, default_value = "2")]
        computers: usize,

        /// Number of human players reading "<player> <slot>" lines from stdin
        #[arg(long, default_value = "0")]
        humans: usize,

        /// Policy of the autonomous players. Valid: random, seeker
        #[arg(long, default_value = "seeker")]
        policy: String,

        /// Delay between two choices of an autonomous player (milliseconds)
        #[arg(long, default_value = "800")]
        think_ms: u64,

        /// Random seed for dealing and for the policies
        #[arg(long)]
        seed: Option<u64>,

        /// Terminate the session after this many seconds
        #[arg(long)]
        max_secs: Option<u64>,

        /// Output file for the run report
        #[arg(long, default_value = "report.json")]
        output: PathBuf,
    },

    /// Deal one board from a shuffled deck and list its sets
    Deal {
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            computers,
            humans,
            policy,
            think_ms,
            seed,
            max_secs,
            output,
        } => {
            let policy = parse_policy(&policy)?;
            if humans + computers == 0 {
                bail!("A session needs at least one player");
            }

            let rule: Arc<dyn MatchRule> = Arc::new(config.rule());
            let mut builder = SessionBuilder::new(config.clone())
                .rule(rule.clone())
                .players(humans, PlayerKind::Human)
                .players(computers, PlayerKind::Autonomous);
            if let Some(seed) = seed {
                builder = builder.seed(seed);
            }

            let started_at = Utc::now();
            let clock = tokio::time::Instant::now();
            let session = builder.spawn()?;
            info!(
                session = %session.id(),
                humans,
                computers,
                policy = policy.name(),
                "Session started"
            );

            let mut drivers = Vec::with_capacity(computers);
            for actor in humans..humans + computers {
                let rng = match seed {
                    Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(actor as u64 + 1)),
                    None => ChaCha8Rng::from_entropy(),
                };
                let input = session
                    .input(actor)
                    .with_context(|| format!("no input for player {}", actor))?;
                let driver = AutonomousDriver::new(
                    input,
                    session.board().clone(),
                    policy.build(rule.clone(), rng),
                    Duration::from_millis(think_ms),
                    session.shutdown_token(),
                );
                drivers.push(driver.spawn());
            }

            if humans > 0 {
                let inputs: HashMap<_, _> = (0..humans)
                    .filter_map(|actor| session.input(actor).map(|input| (actor, input)))
                    .collect();
                println!(
                    "Human players 0..{}: type \"<player> <slot>\" to toggle a marker (slots 0..{})",
                    humans,
                    config.table_size
                );
                // the thread may stay blocked on stdin; it dies with the process
                let _reader = spawn_stdin_reader(inputs);
            }

            let mut terminated = false;
            if let Some(secs) = max_secs {
                let shutdown = session.shutdown_token();
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                        info!(max_secs = secs, "Time limit reached");
                        session.terminate();
                        terminated = true;
                    }
                }
            }

            let report = session.join().await?;
            let mut choices = 0;
            for driver in drivers {
                choices += driver.await.context("driver task failed")?;
            }
            let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

            println!("\n=== Session Result ===");
            println!("Session: {}", report.session_id);
            println!("Duration: {:.1}s", duration_ms as f64 / 1000.0);
            println!("Terminated early: {}", terminated);
            println!("Winners: {:?}", report.winners);
            println!("\nScores:");
            for (actor, score) in &report.scores {
                let kind = if *actor < humans { "human" } else { "computer" };
                println!("  {:>3} ({:<8}) {}", actor, kind, score);
            }
            println!("\nArbiter:");
            println!("  Turns: {}", report.stats.turns);
            println!("  Timeouts: {}", report.stats.timeouts);
            println!("  Reshuffles: {}", report.stats.reshuffles);
            println!("  Correct claims: {}", report.stats.correct);
            println!("  Incorrect claims: {}", report.stats.incorrect);
            println!("  Requeued claims: {}", report.stats.requeued);
            println!("  Withdrawn claims: {}", report.stats.withdrawn);
            println!("  Autonomous choices: {}", choices);

            let result = RunResult {
                started_at,
                finished_at: Utc::now(),
                duration_ms,
                humans,
                computers,
                policy,
                seed,
                terminated,
                config,
                report,
            };
            let output_path = timestamped_path(&output);
            result.save(&output_path)?;
            println!("\nReport saved to: {}", output_path.display());
        }

        Commands::Deal { seed } => {
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            let rule = config.rule();

            let mut deck: Vec<Card> = (0..config.deck_size as u32).map(Card).collect();
            deck.shuffle(&mut rng);
            let board: Vec<Card> = deck.into_iter().take(config.table_size).collect();

            println!("=== Board ===");
            for (slot, card) in board.iter().enumerate() {
                println!("  {:>3}: {:>4}  {:?}", slot, card.raw(), rule.features(*card));
            }

            let sets = find_sets(&rule, &board, usize::MAX);
            println!("\nSets: {}", sets.len());
            for set in &sets {
                let slots: Vec<usize> = set
                    .iter()
                    .filter_map(|card| board.iter().position(|c| c == card))
                    .collect();
                println!("  slots {:?}: {} {} {}", slots, set[0], set[1], set[2]);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::from_path(path),
        None => Ok(SessionConfig::default()),
    }
}

fn parse_policy(s: &str) -> Result<PolicyKind> {
    match s.to_lowercase().as_str() {
        "random" | "rand" => Ok(PolicyKind::Random),
        "seeker" | "seek" => Ok(PolicyKind::Seeker),
        _ => bail!("Unknown policy: {}. Valid: random, seeker", s),
    }
}
