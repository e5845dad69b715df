//! agora: command-line adapter for the Agora decision kernel.
//!
//! Every subcommand reads JSON records from disk, runs one kernel pass under
//! the loaded policy and prints the result as JSON on stdout. Logs go to
//! stderr. With `--audit-log` the result is also appended to a hash-chained
//! audit log.

mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use agora_cluster::{ClusterEngine, ClusterId, PromotionEngine, SignalCluster};
use agora_consensus::{CollusionDetector, finalize};
use agora_core::KernelPolicy;
use agora_core::audit::{AuditEntry, AuditLog};
use agora_core::geocell::{DEFAULT_CELL_SIZE_DEG, GridProximity};
use agora_core::proposal::Proposal;
use agora_core::types::{ParticipantInfluenceRecord, Signal, ValidatorVoteRecord};
use agora_influence::{ConcentrationControl, RoundInput, RoundSettlement};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Agora decision kernel.
#[derive(Parser)]
#[command(name = "agora")]
#[command(version, about = "Deterministic signal aggregation and conserved influence kernel")]
struct Cli {
    /// Policy file (TOML). Defaults to <config_dir>/agora/policy.toml when present.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Append each result to this audit log (JSON array of entries).
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a batch of signals, optionally running automatic promotion.
    Cluster(ClusterArgs),
    /// Explicitly promote a grouping of clusters one level up.
    Promote(PromoteArgs),
    /// Settle a resolution round under the zero-sum law.
    Settle(SettleArgs),
    /// Gini coefficient and concentration tax over influence records.
    Gini(GiniArgs),
    /// Scan validator vote histories for collusion.
    Collusion(CollusionArgs),
    /// Run a validating proposal through the quorum gate.
    Quorum(QuorumArgs),
    /// Verify a hash-chained audit log.
    AuditVerify(AuditVerifyArgs),
}

#[derive(Args)]
struct ClusterArgs {
    /// JSON array of signals.
    #[arg(long)]
    signals: PathBuf,

    /// JSON array of the current clusters (empty when omitted).
    #[arg(long)]
    clusters: Option<PathBuf>,

    /// Run automatic promotion over the result.
    #[arg(long)]
    promote: bool,

    /// Grid cell edge in degrees, used for promotion adjacency.
    #[arg(long, default_value_t = DEFAULT_CELL_SIZE_DEG)]
    cell_size: f64,
}

#[derive(Args)]
struct PromoteArgs {
    /// JSON array of the current clusters.
    #[arg(long)]
    clusters: PathBuf,

    /// Cluster ids to promote together (comma-separated hex).
    #[arg(long, value_delimiter = ',', required = true)]
    children: Vec<ClusterId>,

    /// Grid cell edge in degrees.
    #[arg(long, default_value_t = DEFAULT_CELL_SIZE_DEG)]
    cell_size: f64,
}

#[derive(Args)]
struct SettleArgs {
    /// JSON round input: participants, treasury, vitality, resolutions, slashes.
    #[arg(long)]
    round: PathBuf,

    /// Also print the updated participant records and treasury.
    #[arg(long)]
    apply: bool,
}

#[derive(Args)]
struct GiniArgs {
    /// JSON array of participant influence records.
    #[arg(long)]
    records: PathBuf,
}

#[derive(Args)]
struct CollusionArgs {
    /// JSON array of validator vote records, or of participant records
    /// whose `vote_history` is swept under the participant id.
    #[arg(long)]
    votes: PathBuf,
}

#[derive(Args)]
struct QuorumArgs {
    /// JSON proposal in validating status.
    #[arg(long)]
    proposal: PathBuf,

    /// Number of validators in the round.
    #[arg(long)]
    validators: usize,
}

#[derive(Args)]
struct AuditVerifyArgs {
    /// Audit log to verify.
    #[arg(long)]
    log: PathBuf,
}

/// A kernel result and the audit kind it is recorded under.
struct Report {
    kind: &'static str,
    body: Value,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let policy = settings::load_policy(cli.policy.as_deref())?;
    tracing::debug!(?policy, "policy loaded");

    let report = match cli.command {
        Commands::Cluster(args) => cmd_cluster(&policy, args)?,
        Commands::Promote(args) => cmd_promote(&policy, args)?,
        Commands::Settle(args) => cmd_settle(&policy, args)?,
        Commands::Gini(args) => cmd_gini(&policy, args)?,
        Commands::Collusion(args) => cmd_collusion(&policy, args)?,
        Commands::Quorum(args) => cmd_quorum(args)?,
        Commands::AuditVerify(args) => {
            let body = verify_audit(&args.log)?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report.body)?);
    if let Some(path) = &cli.audit_log {
        append_audit(path, report.kind, &report.body)?;
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))
}

fn grid(cell_size: f64) -> Result<GridProximity> {
    GridProximity::new(cell_size).context("Invalid cell size")
}

fn cmd_cluster(policy: &KernelPolicy, args: ClusterArgs) -> Result<Report> {
    let signals: Vec<Signal> = read_json(&args.signals)?;
    let existing: Vec<SignalCluster> = match &args.clusters {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let clustering = ClusterEngine::new(policy.cluster.clone())
        .cluster(&existing, &signals)
        .context("Clustering failed")?;
    tracing::info!(
        clusters = clustering.clusters.len(),
        ready = clustering.ready.len(),
        unclustered = clustering.unclustered.len(),
        "clustering pass complete"
    );

    if !args.promote {
        return Ok(Report { kind: "clustering", body: serde_json::to_value(&clustering)? });
    }
    let promotion = PromotionEngine::new(policy.promotion.clone())
        .run(&clustering.clusters, &grid(args.cell_size)?)
        .context("Promotion failed")?;
    Ok(Report {
        kind: "clustering",
        body: json!({
            "clustering": clustering,
            "promotion": promotion,
        }),
    })
}

fn cmd_promote(policy: &KernelPolicy, args: PromoteArgs) -> Result<Report> {
    let clusters: Vec<SignalCluster> = read_json(&args.clusters)?;
    let outcome = PromotionEngine::new(policy.promotion.clone())
        .trigger(&clusters, &args.children, &grid(args.cell_size)?)
        .context("Promotion rejected")?;
    Ok(Report { kind: "promotion", body: serde_json::to_value(&outcome)? })
}

fn cmd_settle(policy: &KernelPolicy, args: SettleArgs) -> Result<Report> {
    let input: RoundInput = read_json(&args.round)?;
    let settlement = RoundSettlement::new(policy).settle(&input).context("Round rejected")?;
    if !args.apply {
        return Ok(Report { kind: "settlement", body: serde_json::to_value(&settlement)? });
    }
    let (participants, treasury) = settlement.apply(&input.participants, input.treasury)?;
    Ok(Report {
        kind: "settlement",
        body: json!({
            "settlement": settlement,
            "participants": participants,
            "treasury": treasury,
        }),
    })
}

fn cmd_gini(policy: &KernelPolicy, args: GiniArgs) -> Result<Report> {
    let records: Vec<ParticipantInfluenceRecord> = read_json(&args.records)?;
    let mut balances = std::collections::BTreeMap::new();
    for r in records {
        if balances.insert(r.participant.clone(), r.influence).is_some() {
            bail!("Duplicate participant: {}", r.participant);
        }
    }
    let assessment = ConcentrationControl::new(policy.concentration.clone()).assess(&balances)?;
    Ok(Report { kind: "concentration", body: serde_json::to_value(&assessment)? })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VoteInput {
    Validators(Vec<ValidatorVoteRecord>),
    Participants(Vec<ParticipantInfluenceRecord>),
}

fn cmd_collusion(policy: &KernelPolicy, args: CollusionArgs) -> Result<Report> {
    let records = match read_json::<VoteInput>(&args.votes)? {
        VoteInput::Validators(records) => records,
        VoteInput::Participants(participants) => participants.iter().map(|p| p.vote_record()).collect(),
    };
    let report = CollusionDetector::new(policy.collusion.clone()).detect(&records)?;
    Ok(Report { kind: "collusion", body: serde_json::to_value(&report)? })
}

fn cmd_quorum(args: QuorumArgs) -> Result<Report> {
    let mut proposal: Proposal = read_json(&args.proposal)?;
    let decision = finalize(&mut proposal, args.validators)
        .with_context(|| format!("Quorum check failed for proposal {}", proposal.id))?;
    Ok(Report {
        kind: "quorum",
        body: json!({
            "decision": decision,
            "proposal": proposal,
        }),
    })
}

fn load_audit(path: &Path) -> Result<AuditLog> {
    let entries: Vec<AuditEntry> = if path.exists() { read_json(path)? } else { Vec::new() };
    Ok(AuditLog::from_entries(entries))
}

/// Append `payload` to the log at `path`, creating it if needed. An existing
/// log must verify before anything is added to it.
fn append_audit(path: &Path, kind: &str, payload: &Value) -> Result<()> {
    let mut log = load_audit(path)?;
    log.verify()
        .with_context(|| format!("Audit log {} failed verification", path.display()))?;
    let entry = log.append(kind, chrono::Utc::now(), payload)?;
    tracing::info!(sequence = entry.sequence, hash = %entry.hash, "audit entry recorded");
    write_json(path, log.entries())
}

fn verify_audit(path: &Path) -> Result<Value> {
    if !path.exists() {
        bail!("Audit log not found: {}", path.display());
    }
    let log = load_audit(path)?;
    log.verify()
        .with_context(|| format!("Audit log {} failed verification", path.display()))?;
    Ok(json!({
        "entries": log.len(),
        "head": log.head().to_string(),
        "valid": true,
    }))
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. Both write to stderr.
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
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
