use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sunflower::dataset::{write_csv, DatasetRow};
use sunflower::features::{FeatureVector, Label};
use sunflower::services::llm::client::DEFAULT_API_URL;
use sunflower::services::llm::ExplainClient;
use sunflower::store::{load_record, FileRecordStore, RecordStore};
use sunflower::{CollectorConfig, RunRequest, SandboxCollector};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sandbox behaviour collector", long_about = None)]
struct Cli {
    /// Directory the target runs in and the watcher observes
    #[arg(long, global = true, env = "SUNFLOWER_SANDBOX", default_value = "sandbox")]
    sandbox: PathBuf,

    /// Directory finished records are written to
    #[arg(long, global = true, env = "SUNFLOWER_RUNS_DIR", default_value = "data/runs")]
    runs_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one target under observation and persist its record
    Run {
        /// Ground-truth label attached to the record
        label: String,

        /// Seconds before the target is killed and the run aborted
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Target command line
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Collect `per_class` runs of the workload generator for every label.
    /// The sandbox directory is emptied before each run.
    Batch {
        #[arg(long, default_value_t = 1)]
        per_class: usize,

        #[arg(long, default_value = "data/dataset.csv")]
        csv: PathBuf,

        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Assemble a CSV dataset from every stored record
    Dataset {
        #[arg(long, default_value = "data/dataset.csv")]
        csv: PathBuf,
    },

    /// Print the classifier feature vector of a record
    Features { record: PathBuf },

    /// Ask the explanation service about a record
    Explain {
        record: PathBuf,

        /// Predicted label to explain
        #[arg(long)]
        label: Label,

        /// Extra questions asked in the same conversation
        #[arg(long = "follow-up")]
        follow_up: Vec<String>,

        #[arg(long, env = "EXPLAIN_API_URL", default_value = DEFAULT_API_URL)]
        api_url: String,

        #[arg(long, env = "EXPLAIN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Synthetic target behaviour, run inside the sandbox by `batch`
    #[command(hide = true)]
    Workload {
        mode: Label,

        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: stdout belongs to advisory lines when running as a workload.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")?;

    match cli.command {
        Commands::Run { label, timeout, command } => {
            let config = CollectorConfig::new(&cli.sandbox, &cli.runs_dir).with_timeout(Duration::from_secs(timeout));
            let collector = SandboxCollector::from_config(config);
            let record = collector.run(RunRequest::new(label, command)).await?;
            println!("[OK] saved {}", collector.store().record_path(record.sample_id).display());
        }
        Commands::Batch { per_class, csv, timeout } => {
            batch(&cli.sandbox, &cli.runs_dir, per_class, &csv, Duration::from_secs(timeout)).await?;
        }
        Commands::Dataset { csv } => {
            let records = FileRecordStore::new(&cli.runs_dir).list()?;
            let rows: Vec<_> = records.iter().map(DatasetRow::from_record).collect();
            write_dataset(&csv, &rows)?;
            println!("CSV created at {} with {} samples.", csv.display(), rows.len());
        }
        Commands::Features { record } => {
            let record = load_record(&record).with_context(|| format!("Failed to read {:?}", record))?;
            let features = FeatureVector::from_rollup(&record.rollup);
            println!("{}", serde_json::to_string_pretty(&features)?);
        }
        Commands::Explain { record, label, follow_up, api_url, api_key } => {
            let record = load_record(&record).with_context(|| format!("Failed to read {:?}", record))?;
            let mut client = ExplainClient::new(api_url, api_key);
            println!("{}", client.explain(&record, label.as_str()).await?);
            for question in follow_up {
                println!("\n> {question}\n");
                println!("{}", client.follow_up(&question).await?);
            }
        }
        Commands::Workload { mode, root } => {
            sunflower::workload::run(mode, &root).with_context(|| format!("Workload {mode} failed"))?;
        }
    }

    Ok(())
}

async fn batch(sandbox: &Path, runs_dir: &Path, per_class: usize, csv: &Path, timeout: Duration) -> Result<()> {
    let exe = std::env::current_exe().context("Cannot locate own executable")?;
    let exe = exe.to_string_lossy().into_owned();
    let collector = SandboxCollector::from_config(CollectorConfig::new(sandbox, runs_dir).with_timeout(timeout));

    let mut rows = Vec::new();
    for label in Label::ALL {
        tracing::info!("Generating samples for class: {}", label);
        for i in 0..per_class {
            reset_sandbox(sandbox)?;
            let request = RunRequest::new(label.as_str(), [exe.as_str(), "workload", label.as_str()]);
            match collector.run(request).await {
                Ok(record) => rows.push(DatasetRow::from_record(&record)),
                Err(e) => tracing::warn!("Run {} for {} aborted: {}", i, label, e),
            }
        }
    }

    if rows.is_empty() {
        bail!("No run completed; dataset not written");
    }
    write_dataset(csv, &rows)?;
    println!("Dataset CSV created at {} with {} samples.", csv.display(), rows.len());
    Ok(())
}

/// Leaves an empty sandbox so one run's leftovers don't shape the next.
fn reset_sandbox(sandbox: &Path) -> Result<()> {
    if sandbox.exists() {
        std::fs::remove_dir_all(sandbox).with_context(|| format!("Failed to clear {:?}", sandbox))?;
    }
    std::fs::create_dir_all(sandbox)?;
    Ok(())
}

fn write_dataset(csv: &Path, rows: &[DatasetRow]) -> Result<()> {
    if let Some(parent) = csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(csv).with_context(|| format!("Failed to create {:?}", csv))?;
    write_csv(std::io::BufWriter::new(file), rows)?;
    Ok(())
}
