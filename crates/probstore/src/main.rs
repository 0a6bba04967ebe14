use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use probstore::blob::S3BlobStore;
use probstore::repositories::{CounterService, JobRepository, ProblemRepository, UsageRepository};
use probstore::storage::DynamoDbStore;
use probstore::Config;
use probstore_core::job::{JobKind, ReclaimAction};
use probstore_core::storage::ItemStore;

/// probstore - Operator commands for the problem store table
#[derive(Parser, Debug)]
#[command(name = "probstore")]
#[command(version, about, long_about = None)]
struct Cli {
    /// DynamoDB table name
    #[arg(long, global = true, env = "DYNAMODB_TABLE_NAME")]
    table: Option<String>,

    /// Blob bucket for tiered test cases
    #[arg(long, global = true, env = "BLOB_BUCKET")]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and recover background jobs
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Read and maintain atomic counters
    #[command(subcommand)]
    Counter(CounterCommand),

    /// Query and purge usage logs
    #[command(subcommand)]
    Usage(UsageCommand),

    /// Manage stored problems
    #[command(subcommand)]
    Problem(ProblemCommand),
}

#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// List jobs stuck in PROCESSING
    Stale {
        #[arg(long, default_value = "extraction")]
        kind: JobKind,
        /// Override the stale window in minutes
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Reset or fail jobs stuck in PROCESSING
    Reclaim {
        #[arg(long, default_value = "extraction")]
        kind: JobKind,
        /// `reset` puts jobs back in the queue, `fail` gives up on them
        #[arg(long, default_value = "reset")]
        action: ReclaimAction,
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create a retry of a job and cancel the original
    Retry {
        #[arg(long, default_value = "extraction")]
        kind: JobKind,
        job_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum CounterCommand {
    /// Print every counter
    List,
    /// Print a counter's last issued value
    Get { name: String },
    /// Issue the next value
    Next { name: String },
    /// Overwrite a counter, e.g. after a migration
    Set { name: String, value: i64 },
}

#[derive(Subcommand, Debug)]
enum UsageCommand {
    /// Count a subject's logs for a UTC day
    Count {
        subject: String,
        /// Format: YYYY-MM-DD
        day: NaiveDate,
        #[arg(long)]
        action: Option<String>,
    },
    /// Delete a subject's logs for a UTC day
    Purge { subject: String, day: NaiveDate },
}

#[derive(Subcommand, Debug)]
enum ProblemCommand {
    /// Write all test cases of a problem to its snapshot blob
    Snapshot { platform: String, problem_id: String },
    /// Delete a problem, its test cases and their blobs
    Delete { platform: String, problem_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();
    if let Some(table) = cli.table {
        config.table_name = table;
    }
    if let Some(bucket) = cli.bucket {
        config.blob_bucket = bucket;
    }

    let sdk_config = config.sdk_config().await;
    let store: Arc<dyn ItemStore> = Arc::new(DynamoDbStore::new(&sdk_config, &config));

    tracing::debug!(
        table = %config.table_name,
        bucket = %config.blob_bucket,
        region = %config.region,
        "Loaded configuration"
    );

    match cli.command {
        Command::Jobs(command) => run_jobs(command, store, &config).await,
        Command::Counter(command) => run_counter(command, store).await,
        Command::Usage(command) => run_usage(command, store).await,
        Command::Problem(command) => {
            let blobs = Arc::new(S3BlobStore::new(&sdk_config, &config));
            run_problem(command, ProblemRepository::new(store, blobs)).await
        }
    }
}

fn stale_cutoff(config: &Config, minutes: Option<i64>) -> i64 {
    let window = minutes.map_or_else(|| config.stale_after_secs(), |m| m * 60);
    chrono::Utc::now().timestamp() - window
}

async fn run_jobs(command: JobsCommand, store: Arc<dyn ItemStore>, config: &Config) -> Result<()> {
    match command {
        JobsCommand::Stale {
            kind,
            minutes,
            limit,
        } => {
            let jobs = JobRepository::new(store, kind);
            for job in jobs.find_stale(stale_cutoff(config, minutes), limit).await? {
                println!("{}", serde_json::to_string(&job)?);
            }
        }
        JobsCommand::Reclaim {
            kind,
            action,
            minutes,
            limit,
        } => {
            let jobs = JobRepository::new(store, kind);
            let reclaimed = jobs
                .reclaim_stale(stale_cutoff(config, minutes), action, limit)
                .await?;
            println!("Reclaimed {} {} job(s)", reclaimed.len(), kind);
        }
        JobsCommand::Retry { kind, job_id } => {
            let jobs = JobRepository::new(store, kind);
            let retry = jobs
                .retry_job(&job_id)
                .await
                .with_context(|| format!("Failed to retry job {}", job_id))?;
            println!("{}", retry.id);
        }
    }
    Ok(())
}

async fn run_counter(command: CounterCommand, store: Arc<dyn ItemStore>) -> Result<()> {
    let counters = CounterService::new(store);
    match command {
        CounterCommand::List => {
            for counter in counters.list_counters().await? {
                println!("{}\t{}", counter.name, counter.value);
            }
        }
        CounterCommand::Get { name } => match counters.current_value(&name).await? {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Counter {} has never been used", name),
        },
        CounterCommand::Next { name } => println!("{}", counters.next_id(&name).await?),
        CounterCommand::Set { name, value } => counters.set_value(&name, value).await?,
    }
    Ok(())
}

async fn run_usage(command: UsageCommand, store: Arc<dyn ItemStore>) -> Result<()> {
    let usage = UsageRepository::new(store);
    match command {
        UsageCommand::Count {
            subject,
            day,
            action,
        } => {
            let count = usage
                .count_usage(&subject, day, action.as_deref())
                .await?;
            println!("{}", count);
        }
        UsageCommand::Purge { subject, day } => {
            let removed = usage.purge_day(&subject, day).await?;
            println!("Removed {} log(s)", removed);
        }
    }
    Ok(())
}

async fn run_problem(command: ProblemCommand, problems: ProblemRepository) -> Result<()> {
    match command {
        ProblemCommand::Snapshot {
            platform,
            problem_id,
        } => {
            let blob = problems.snapshot_testcases(&platform, &problem_id).await?;
            println!("{} ({} bytes)", blob.key, blob.compressed_size);
        }
        ProblemCommand::Delete {
            platform,
            problem_id,
        } => {
            if !problems.delete_problem(&platform, &problem_id).await? {
                anyhow::bail!("Problem {}/{} not found", platform, problem_id);
            }
        }
    }
    Ok(())
}
