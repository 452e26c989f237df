//! sysmend - automated OS repair CLI
//!
//! ## Commands
//!
//! - `index build`: load a solution corpus and rebuild the semantic index
//! - `index query`: rank corpus entries against free text
//! - `diagnose`: run the diagnostic agent only
//! - `repair`: full diagnose / retrieve / execute / validate session
//! - `report show`: verify and print a stored session report

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use ollama_client::OllamaClient;
use solution_index::{load_corpus, Category, SolutionQuery};
use sysmend_core::{
    read_session_report, write_session_report, CancelFlag, ConfirmationDecision,
    ConfirmationGate, ConfirmationRequest, Issue, OllamaInference, SessionOutcome,
    SessionReport, ShellCommandRunner, SysmendConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

const EXIT_ESCALATED: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "sysmend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose and repair common Ubuntu faults from a vetted solution corpus", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SYSMEND_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solution index operations
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Diagnose an issue without changing the system
    Diagnose {
        /// Issue description
        issue: String,

        /// Suspected fault category
        #[arg(long)]
        category: Option<String>,
    },

    /// Diagnose, apply a vetted solution and validate it
    Repair {
        /// Issue description
        issue: String,

        /// Suspected fault category
        #[arg(long)]
        category: Option<String>,

        /// Override orchestrator.max_retries
        #[arg(long)]
        max_retries: Option<u32>,

        /// Approve critical-risk solutions without prompting
        #[arg(short, long)]
        yes: bool,

        /// Where to write the session report (default: reports.dir)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Stored session reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the index from a corpus file
    Build {
        /// Corpus JSON file
        #[arg(long)]
        corpus: PathBuf,
    },

    /// Show the best matching solutions for some text
    Query {
        /// Free-text query
        text: String,

        /// Number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Restrict results to one category
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Verify and print a session report
    Show {
        /// Session id
        session_id: String,

        /// Report directory (default: reports.dir)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sysmend_core::init_tracing(cli.json, level);

    let config = SysmendConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Index { action } => match action {
            IndexAction::Build { corpus } => cmd_index_build(&config, &corpus).await,
            IndexAction::Query {
                text,
                top_k,
                category,
            } => cmd_index_query(&config, &text, top_k, category.as_deref()).await,
        },
        Commands::Diagnose { issue, category } => {
            cmd_diagnose(&config, &issue, category.as_deref()).await
        }
        Commands::Repair {
            issue,
            category,
            max_retries,
            yes,
            report_dir,
        } => {
            let mut config = config;
            if let Some(max_retries) = max_retries {
                config.orchestrator.max_retries = max_retries;
                config.validate().context("Invalid --max-retries")?;
            }
            if let Some(dir) = report_dir {
                config.reports.dir = dir;
            }
            cmd_repair(&config, &issue, category.as_deref(), yes).await
        }
        Commands::Report { action } => match action {
            ReportAction::Show {
                session_id,
                report_dir,
            } => cmd_report_show(
                &session_id,
                report_dir.as_deref().unwrap_or(config.reports.dir.as_path()),
            ),
        },
    }
}

fn parse_category(raw: Option<&str>) -> Result<Option<Category>> {
    raw.map(|c| c.parse::<Category>().map_err(anyhow::Error::msg))
        .transpose()
}

fn build_issue(description: &str, category: Option<&str>) -> Result<Issue> {
    let issue = Issue::new(description);
    Ok(match parse_category(category)? {
        Some(category) => issue.with_category(category),
        None => issue,
    })
}

async fn connect_ollama(config: &SysmendConfig) -> Result<OllamaClient> {
    let client = config.ollama_client()?;
    if !client.is_available().await {
        anyhow::bail!(
            "Ollama server at {} is not reachable (set OLLAMA_HOST or [ollama].base_url)",
            client.config().base_url
        );
    }
    Ok(client)
}

/// Rebuild the index from a corpus file
async fn cmd_index_build(config: &SysmendConfig, corpus: &Path) -> Result<ExitCode> {
    let records = load_corpus(corpus)
        .with_context(|| format!("Failed to load corpus {}", corpus.display()))?;
    let index = config.open_index().context("Failed to open solution index")?;
    let summary = index
        .rebuild(&records)
        .await
        .context("Failed to rebuild solution index")?;

    println!("Indexed {} solutions into '{}'", summary.total, summary.collection);
    println!("Embedder: {}", summary.embedder);
    for (category, count) in &summary.by_category {
        println!("  {:<16} {count}", category.as_str());
    }
    if let Some(digest) = &summary.digest {
        println!("Digest: {digest}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Rank solutions against free text
async fn cmd_index_query(
    config: &SysmendConfig,
    text: &str,
    top_k: usize,
    category: Option<&str>,
) -> Result<ExitCode> {
    let index = config.open_index().context("Failed to open solution index")?;
    if index.is_empty().await {
        warn!("solution index is empty; run `sysmend index build` first");
    }

    let mut query = SolutionQuery::new(text).with_top_k(top_k);
    if let Some(category) = parse_category(category)? {
        query = query.with_category(category);
    }

    let hits = index.query(&query).await?;
    if hits.is_empty() {
        println!("No matching solutions");
    }
    for (rank, hit) in hits.iter().enumerate() {
        let record = &hit.solution.record;
        println!(
            "{:>2}. {:<12} {:.3}  [{} / {}]  {}",
            rank + 1,
            hit.solution.id,
            hit.score,
            record.category,
            record.risk_level,
            record.error_trigger
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Run the diagnostic agent once
async fn cmd_diagnose(config: &SysmendConfig, issue: &str, category: Option<&str>) -> Result<ExitCode> {
    let issue = build_issue(issue, category)?;
    let client = connect_ollama(config).await?;
    let agent = config.diagnostic_agent(
        Arc::new(OllamaInference::new(client)),
        Arc::new(ShellCommandRunner::default()),
    )?;

    let diagnosis = agent.diagnose(&issue).await.context("Diagnosis failed")?;
    println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    Ok(ExitCode::SUCCESS)
}

/// Full repair session
async fn cmd_repair(
    config: &SysmendConfig,
    issue: &str,
    category: Option<&str>,
    assume_yes: bool,
) -> Result<ExitCode> {
    let issue = build_issue(issue, category)?;
    let client = connect_ollama(config).await?;
    let index = config.open_index().context("Failed to open solution index")?;
    if index.is_empty().await {
        anyhow::bail!("solution index is empty; run `sysmend index build` first");
    }

    let gate: Arc<dyn ConfirmationGate> = if assume_yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdinConfirmation)
    };
    let orchestrator = config.orchestrator(
        Arc::new(OllamaInference::new(client)),
        Arc::new(ShellCommandRunner::default()),
        Arc::new(index),
        gate,
    )?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next state boundary");
            on_interrupt.cancel();
        }
    });

    let report = orchestrator.run(issue, &cancel).await;
    let path = write_session_report(&report, &config.reports.dir)
        .context("Failed to write session report")?;

    print_summary(&report);
    println!("Report: {}", path.display());

    Ok(ExitCode::from(exit_code(&report.outcome)))
}

fn exit_code(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Succeeded { .. } => 0,
        SessionOutcome::Escalated { .. } => EXIT_ESCALATED,
        SessionOutcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

fn print_summary(report: &SessionReport) {
    println!("Session: {}", report.session_id);
    println!(
        "Passes: {}  Retries: {}/{}",
        report.history().len(),
        report.retry_count,
        report.max_retries
    );

    match &report.outcome {
        SessionOutcome::Succeeded {
            solution_id,
            validation_output,
            requires_reboot,
            ..
        } => {
            println!("✓ Repaired with {solution_id}");
            if !validation_output.trim().is_empty() {
                println!("Validation output:\n{}", validation_output.trim_end());
            }
            if *requires_reboot {
                println!("A reboot is required to complete this repair.");
            }
        }
        SessionOutcome::Escalated {
            reason,
            alternative_solution,
            ..
        } => {
            println!("✗ Escalated: {reason}");
            if let Some(diagnosis) = report.diagnoses().last() {
                println!("Last diagnosis: {} ({})", diagnosis.explanation, diagnosis.category);
            }
            if let Some(alternative) = alternative_solution {
                println!("Manual alternative (not executed): {alternative}");
            }
        }
        SessionOutcome::Cancelled {
            last_state,
            unvalidated_attempts,
            ..
        } => {
            println!("Cancelled during {last_state}");
            for attempt in unvalidated_attempts {
                println!(
                    "  ! {} applied {} step(s) that were never validated",
                    attempt.solution_id,
                    attempt.steps.len()
                );
            }
        }
    }
}

/// Verify and print a stored report
fn cmd_report_show(session_id: &str, dir: &Path) -> Result<ExitCode> {
    let report = read_session_report(session_id, dir)
        .with_context(|| format!("Failed to read report {session_id} from {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

/// `--yes`: every request is granted.
struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        info!(solution_id = %request.solution_id, risk = %request.risk_level, "auto-approved");
        ConfirmationDecision::Granted
    }
}

/// Interactive y/N prompt on the controlling terminal.
struct StdinConfirmation;

#[async_trait]
impl ConfirmationGate for StdinConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        eprintln!();
        eprintln!(
            "{} ({} risk, score {:.3}) needs confirmation",
            request.solution_id, request.risk_level, request.score
        );
        eprintln!("Diagnosis: {}", request.diagnosis.explanation);
        eprintln!("Plan: {}", request.explanation);
        for (i, step) in request.steps.iter().enumerate() {
            eprintln!("  {}. {step}", i + 1);
        }
        if request.backup_required {
            eprintln!("A backup will be taken first.");
        }
        if request.requires_reboot {
            eprintln!("A reboot will be required afterwards.");
        }
        if let Some(alternative) = &request.alternative_solution {
            eprintln!("Alternative: {alternative}");
        }
        eprint!("Apply this solution? [y/N] ");

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(0) | Err(_) => ConfirmationDecision::Denied {
                reason: "no operator input".to_string(),
            },
            Ok(_) => parse_answer(&line),
        }
    }
}

fn parse_answer(line: &str) -> ConfirmationDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ConfirmationDecision::Granted,
        _ => ConfirmationDecision::Denied {
            reason: "operator declined".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sysmend_core::{EmbedderKind, EscalationReason, RepairState};

    const CORPUS: &str = r#"[
      {
        "category": "network",
        "error_trigger": "Temporary failure in name resolution",
        "context": "systemd-resolved stopped",
        "solution_explanation": "Restart systemd-resolved",
        "risk_level": "low",
        "steps": ["systemctl restart systemd-resolved"],
        "backup_required": false,
        "requires_reboot": false,
        "validation_command": "getent hosts ubuntu.com"
      }
    ]"#;

    fn config_in(dir: &Path) -> SysmendConfig {
        let mut config = SysmendConfig::default();
        config.index.dir = dir.join("index");
        config.index.embedder = EmbedderKind::Hash;
        config.reports.dir = dir.join("sessions");
        config
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repair_flags_parse() {
        let cli = Cli::try_parse_from([
            "sysmend",
            "--json",
            "repair",
            "apt is broken",
            "--max-retries",
            "2",
            "--yes",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Repair {
                issue,
                max_retries,
                yes,
                ..
            } => {
                assert_eq!(issue, "apt is broken");
                assert_eq!(max_retries, Some(2));
                assert!(yes);
            }
            _ => panic!("expected repair"),
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(build_issue("x", Some("kernel")).is_err());
        assert_eq!(
            build_issue("x", Some("storage")).unwrap().category,
            Some(Category::Storage)
        );
    }

    #[test]
    fn test_answers() {
        assert_eq!(parse_answer("y\n"), ConfirmationDecision::Granted);
        assert_eq!(parse_answer(" YES "), ConfirmationDecision::Granted);
        assert!(matches!(parse_answer("\n"), ConfirmationDecision::Denied { .. }));
        assert!(matches!(parse_answer("nope"), ConfirmationDecision::Denied { .. }));
    }

    #[test]
    fn test_exit_codes() {
        let succeeded = SessionOutcome::Succeeded {
            solution_id: "solution_0".into(),
            validation_output: String::new(),
            requires_reboot: false,
            history: Vec::new(),
        };
        let escalated = SessionOutcome::Escalated {
            reason: EscalationReason::RetryBudgetExhausted { max_retries: 3 },
            history: Vec::new(),
            alternative_solution: None,
        };
        let cancelled = SessionOutcome::Cancelled {
            last_state: RepairState::Executing,
            unvalidated_attempts: Vec::new(),
            history: Vec::new(),
        };
        assert_eq!(exit_code(&succeeded), 0);
        assert_eq!(exit_code(&escalated), 2);
        assert_eq!(exit_code(&cancelled), 130);
    }

    #[tokio::test]
    async fn test_index_build_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("solutions.json");
        std::fs::write(&corpus, CORPUS).unwrap();
        let config = config_in(dir.path());

        cmd_index_build(&config, &corpus).await.unwrap();
        let index = config.open_index().unwrap();
        assert_eq!(index.len().await, 1);

        cmd_index_query(&config, "name resolution", 3, Some("network"))
            .await
            .unwrap();
        assert!(cmd_index_query(&config, "dns", 3, Some("dns")).await.is_err());
    }

    #[test]
    fn test_report_show_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_report_show("does-not-exist", dir.path()).is_err());
    }
}
