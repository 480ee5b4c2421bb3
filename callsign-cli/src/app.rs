use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use callsign_github::{GithubConfig, GithubCredentials, GithubStore, Quota};
use callsign_ledger::{
    AllocationRequest, Allocator, AllocatorSettings, CancelToken, CreateOutcome, FileStore, Ledger,
    LedgerStore,
};

use crate::telemetry;

/// Issue unique sequential codes from a shared ledger.
#[derive(Parser)]
#[command(
    name = "callsign",
    version,
    about = "Sequential code allocation backed by a versioned document store"
)]
pub struct Cli {
    /// Log filter, e.g. `info` or `callsign=debug`.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Allocate the next code for a requester.
    Allocate(AllocateArgs),
    /// Create the ledger document ahead of first use.
    Init(InitArgs),
    /// Show the next code and how many codes were issued.
    Status(StoreArgs),
    /// List issued codes, newest first.
    History(HistoryArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// Keep the ledger in a local JSON file. Takes precedence over GitHub.
    #[arg(long, env = "CALLSIGN_LEDGER_FILE")]
    ledger_file: Option<PathBuf>,

    /// Repository owner hosting the ledger document.
    #[arg(long, env = "GITHUB_OWNER")]
    github_owner: Option<String>,

    #[arg(long, env = "GITHUB_REPO")]
    github_repo: Option<String>,

    #[arg(long, env = "GITHUB_BRANCH", default_value = "main")]
    github_branch: String,

    /// Path of the ledger document inside the repository.
    #[arg(long, env = "CALLSIGN_LEDGER_PATH", default_value = "codes.json")]
    github_path: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// API root override, mainly for tests and GitHub Enterprise.
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    github_api_url: String,

    /// Cap contents-API requests per second.
    #[arg(long)]
    requests_per_second: Option<NonZeroU32>,
}

impl StoreArgs {
    fn build(&self) -> Result<Arc<dyn LedgerStore>> {
        if let Some(path) = &self.ledger_file {
            return Ok(Arc::new(FileStore::new(path)));
        }

        let owner = self
            .github_owner
            .clone()
            .ok_or_else(|| anyhow!("either --ledger-file or --github-owner is required"))?;
        let repo = self
            .github_repo
            .clone()
            .ok_or_else(|| anyhow!("--github-repo is required for the GitHub backend"))?;
        let token = self.github_token.clone().ok_or_else(|| {
            anyhow!("--github-token (or GITHUB_TOKEN) is required for the GitHub backend")
        })?;

        let mut config = GithubConfig::new(owner, repo)
            .with_api_url(self.github_api_url.as_str())
            .with_branch(self.github_branch.as_str())
            .with_path(self.github_path.as_str());
        if let Some(rps) = self.requests_per_second {
            config = config.with_request_quota(Quota::per_second(rps));
        }
        Ok(Arc::new(GithubStore::new(
            config,
            GithubCredentials { token },
        )))
    }
}

#[derive(Args)]
struct LedgerArgs {
    /// Prefix stamped on every code, e.g. `OPS-`.
    #[arg(long, env = "CALLSIGN_PREFIX", default_value = "C-")]
    prefix: String,

    /// First number issued when the ledger does not exist yet.
    #[arg(long, env = "CALLSIGN_START", default_value_t = 1)]
    start: u64,
}

#[derive(Args)]
struct AllocateArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    ledger: LedgerArgs,

    /// Identity the code is issued to.
    #[arg(long)]
    requester: String,

    /// Display name recorded next to the code.
    #[arg(long)]
    label: String,

    /// Conflicting writes tolerated before reporting contention.
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,
}

#[derive(Args)]
struct InitArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    ledger: LedgerArgs,
}

#[derive(Args)]
struct HistoryArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Show at most this many entries.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log);
    match cli.command {
        Command::Allocate(args) => allocate(args).await,
        Command::Init(args) => init(args).await,
        Command::Status(args) => status(args).await,
        Command::History(args) => history(args).await,
    }
}

async fn allocate(args: AllocateArgs) -> Result<()> {
    let store = args.store.build()?;
    let settings = AllocatorSettings::new(args.ledger.prefix.as_str())
        .with_start(args.ledger.start)
        .with_max_attempts(args.max_attempts);
    let allocator = Allocator::new(store, settings);

    let cancel = CancelToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let issued = allocator
        .allocate_with_cancel(
            AllocationRequest::new(args.requester.as_str(), args.label.as_str()),
            &cancel,
        )
        .await?;
    println!("{}", issued.code);
    Ok(())
}

async fn init(args: InitArgs) -> Result<()> {
    let store = args.store.build()?;
    let ledger = Ledger::new(args.ledger.prefix.as_str(), args.ledger.start);
    match store.create(&ledger).await? {
        CreateOutcome::Created(_) => {
            info!(prefix = %args.ledger.prefix, start = args.ledger.start, "ledger created");
            println!("created");
        }
        CreateOutcome::AlreadyExists => println!("ledger already exists"),
    }
    Ok(())
}

async fn status(args: StoreArgs) -> Result<()> {
    let store = args.build()?;
    match store.read().await? {
        Some(snapshot) => {
            let ledger = snapshot.ledger;
            println!("next code: {}", ledger.code_for(ledger.next_sequence));
            println!("issued:    {}", ledger.assignments.len());
        }
        None => println!("ledger not created yet"),
    }
    Ok(())
}

async fn history(args: HistoryArgs) -> Result<()> {
    let store = args.store.build()?;
    let Some(snapshot) = store.read().await? else {
        bail!("ledger not created yet");
    };
    for assignment in snapshot.ledger.assignments.iter().rev().take(args.limit) {
        println!(
            "{}\t{}\t{}\t{}",
            assignment.code,
            assignment.label,
            assignment.requester_id,
            assignment.issued_at.to_rfc3339()
        );
    }
    Ok(())
}
