//! Training Store CLI
//!
//! Imports training catalogs and drives one learner through them.
//!
//! ## Usage
//!
//! ```bash
//! # Import a catalog
//! training-store import onboarding.json
//!
//! # Where is the learner?
//! training-store --user alice status onboarding
//!
//! # Open a module, submit a result, move on
//! training-store --user alice start onboarding
//! training-store --user alice complete onboarding --score 85 --time 240
//! training-store --user alice next onboarding --from welcome
//!
//! # Earned certificates and XP
//! training-store --user alice certificates
//!
//! # Custom storage directory, JSON output
//! training-store --storage-dir /data/training --json --user alice status onboarding
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use training_engine::events::spawn_logging_listener;
use training_engine::{
    CertificateStatus, CertificateStore, CompletionResult, Module, ModuleStatus, ProgressEngine,
    RewardStatus, SessionCompletion, StepEvidence, TrainingSummary,
};
use training_store::db::{catalog, rewards};
use training_store::{import_file, Config, ProgressDb, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "training-store")]
#[command(about = "Training progression with local SQLite storage")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Learner id
    #[arg(long, env = "TRAINING_USER", global = true)]
    user: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and store a training catalog from a JSON file
    Import { file: PathBuf },

    /// List imported trainings
    Trainings,

    /// Show the learner's progress through a training
    Status { training: String },

    /// Open a module (default: where the learner left off) and mark it started
    Start {
        training: String,
        #[arg(long)]
        module: Option<String>,
    },

    /// Submit a completion for a module (default: where the learner left off)
    Complete {
        training: String,
        #[arg(long)]
        module: Option<String>,

        /// Score 0-100
        #[arg(long)]
        score: Option<u8>,

        /// Seconds spent on the module
        #[arg(long, default_value_t = 0)]
        time: u64,

        /// Quiz answers as option indexes; graded answers replace --score
        #[arg(long, value_delimiter = ',')]
        answers: Option<Vec<usize>>,
    },

    /// Move to the module after `--from` (default: where the learner left off)
    Next {
        training: String,
        #[arg(long)]
        from: Option<String>,
    },

    /// List the learner's certificates and XP/coin totals
    Certificates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("training_store=info".parse()?)
                .add_directive("training_engine=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else {
        Config::default()
    };

    if let Some(dir) = args.storage_dir.clone() {
        config.storage_dir = dir;
    }

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    let config_path = config.config_path();
    if args.config.is_none() && !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(ProgressDb::open(&config.database_path())?);
    let store = SqliteStore::new(db);
    let engine = ProgressEngine::new(store.collaborators(), config.engine.clone());
    let listener = spawn_logging_listener(engine.events());

    let result = run(&args, &engine, &store).await;

    drop(engine);
    listener.abort();
    result
}

async fn run(args: &Args, engine: &ProgressEngine, store: &SqliteStore) -> anyhow::Result<()> {
    match &args.command {
        Command::Import { file } => {
            let report = import_file(store.db(), file)
                .with_context(|| format!("importing {}", file.display()))?;
            if args.json {
                print_json(&report)?;
            } else {
                println!(
                    "Imported '{}' ({}): {} modules, {} checkpoints",
                    report.title, report.training_id, report.module_count, report.checkpoint_count
                );
            }
        }

        Command::Trainings => {
            let trainings = store.db().with_conn(catalog::list_trainings)?;
            if args.json {
                print_json(&trainings)?;
            } else if trainings.is_empty() {
                println!("No trainings imported");
            } else {
                for t in &trainings {
                    println!(
                        "{:<24} {} ({} XP, {} coins{})",
                        t.id,
                        t.title,
                        t.xp_reward,
                        t.coins_reward,
                        if t.certificate_enabled { ", certificate" } else { "" }
                    );
                }
            }
        }

        Command::Status { training } => {
            let user = require_user(args)?;
            let session = engine.open_session(user, training).await?;
            let summary = session.summary();
            if args.json {
                print_json(&summary)?;
            } else {
                print_summary(&summary, session.current_module());
            }
        }

        Command::Start { training, module } => {
            let user = require_user(args)?;
            let mut session = engine.open_session(user, training).await?;
            let opened = match module {
                Some(id) => session.select_module(id).await?,
                None => {
                    session.begin().await?;
                    current_or_fail(session.current_module())?
                }
            };
            print_module(args.json, &opened)?;
        }

        Command::Complete {
            training,
            module,
            score,
            time,
            answers,
        } => {
            let user = require_user(args)?;
            let mut session = engine.open_session(user, training).await?;

            let mut result = CompletionResult {
                score: *score,
                time_spent_seconds: *time,
                evidence: None,
            };
            if let Some(answers) = answers {
                result = result.evidence(StepEvidence::QuizAnswers {
                    answers: answers.clone(),
                });
            }

            let completion = match module {
                Some(id) => session.complete_module(id, result).await?,
                None => session.complete_current(result).await?,
            };
            if args.json {
                print_json(&completion)?;
            } else {
                print_completion(&completion);
            }
        }

        Command::Next { training, from } => {
            let user = require_user(args)?;
            let mut session = engine.open_session(user, training).await?;
            if let Some(id) = from {
                session.select_module(id).await?;
            }
            let next = session.go_next().await?;
            print_module(args.json, &next)?;
        }

        Command::Certificates => {
            let user = require_user(args)?;
            let certificates = store.certificates_for_user(user).await?;
            let (xp, coins) = store.db().with_conn(|conn| rewards::totals(conn, user))?;
            if args.json {
                print_json(&serde_json::json!({
                    "user_id": user,
                    "xp": xp,
                    "coins": coins,
                    "certificates": certificates,
                }))?;
            } else {
                println!("{}: {} XP, {} coins", user, xp, coins);
                if certificates.is_empty() {
                    println!("No certificates yet");
                }
                for c in &certificates {
                    println!(
                        "  {}  {}  issued {}",
                        c.certificate_number,
                        c.training_id,
                        c.issued_at.format("%Y-%m-%d")
                    );
                }
            }
        }
    }

    Ok(())
}

fn require_user(args: &Args) -> anyhow::Result<&str> {
    args.user
        .as_deref()
        .context("--user (or TRAINING_USER) is required for this command")
}

fn current_or_fail(module: Option<&Module>) -> anyhow::Result<Module> {
    match module {
        Some(m) => Ok(m.clone()),
        None => bail!("training has no current module"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_module(json: bool, module: &Module) -> anyhow::Result<()> {
    if json {
        return print_json(module);
    }
    println!(
        "Now on #{} {} ({}, ~{} min)",
        module.position,
        module.title,
        module.step_type(),
        module.duration_minutes
    );
    if let Some(min) = module.min_score {
        if module.is_checkpoint {
            println!("Checkpoint: score at least {}% to continue", min);
        } else {
            println!("Score at least {}% to unlock the next module", min);
        }
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary, current: Option<&Module>) {
    println!(
        "{}: {}/{} modules, {}%{}",
        summary.training_id,
        summary.completed_modules,
        summary.total_modules,
        summary.percentage,
        summary
            .average_score
            .map(|s| format!(", average score {}%", s))
            .unwrap_or_default()
    );
    println!(
        "Earned {} XP, {} coins; about {} min remaining",
        summary.xp_earned, summary.coins_earned, summary.estimated_minutes_remaining
    );

    for m in &summary.modules {
        let marker = if current.map(|c| c.id == m.module_id).unwrap_or(false) {
            ">"
        } else {
            " "
        };
        let status = match m.status {
            ModuleStatus::Completed => "done",
            ModuleStatus::InProgress => "started",
            ModuleStatus::Available => "open",
            ModuleStatus::Locked => "locked",
        };
        let score = m.score.map(|s| format!(" {}%", s)).unwrap_or_default();
        println!(
            "{} {:>2}. [{:<7}] {} ({}){}{}",
            marker,
            m.position,
            status,
            m.title,
            m.step_type,
            score,
            if m.is_checkpoint { " checkpoint" } else { "" }
        );
    }
}

fn print_completion(completion: &SessionCompletion) {
    let outcome = &completion.outcome;

    if let Some(rejection) = &outcome.rejection {
        println!("{}", rejection.message());
        return;
    }

    match &outcome.score {
        Some(score) => println!("Module completed with {}% ({}% of training)", score, outcome.percentage),
        None => println!("Module completed ({}% of training)", outcome.percentage),
    }
    if let RewardStatus::Granted { grant } = &outcome.module_reward {
        println!("+{} XP, +{} coins", grant.xp, grant.coins);
    }
    for id in &completion.newly_unlocked {
        println!("Unlocked {}", id);
    }

    if outcome.training_now_complete {
        println!("Training complete!");
        if let RewardStatus::Granted { grant } = &outcome.training_reward {
            println!("Training bonus: +{} XP, +{} coins", grant.xp, grant.coins);
        }
        if let CertificateStatus::Issued { certificate } = &outcome.certificate {
            println!("Certificate {}", certificate.certificate_number);
        }
    } else if let Some(next) = &completion.next_module {
        println!("Next: {}", next);
    }
}
