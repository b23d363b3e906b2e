use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dataproc_prefetch::{
    artifacts::ensure_pre_downloads,
    config::{load_settings, load_user_settings, PrefetchSettings},
};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PREFETCH_LOG";

/// Pre-fetch the Hadoop and Spark distributions a cluster build needs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (JSON); defaults to the per-user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory for downloaded archives
    #[arg(long)]
    downloads_dir: Option<String>,

    #[arg(long)]
    hadoop_version: Option<String>,

    #[arg(long)]
    spark_version: Option<String>,

    #[arg(long)]
    hadoop_mirror: Option<String>,

    #[arg(long)]
    spark_mirror: Option<String>,

    /// Print the resolved plan without touching the disk or network
    #[arg(long)]
    dry_run: bool,

    /// Print the per-artifact report as JSON when done
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(self, mut settings: PrefetchSettings) -> PrefetchSettings {
        if let Some(dir) = self.downloads_dir {
            settings.downloads_dir = dir;
        }
        settings.hadoop_version = self.hadoop_version.or(settings.hadoop_version);
        settings.spark_version = self.spark_version.or(settings.spark_version);
        settings.hadoop_mirror = self.hadoop_mirror.or(settings.hadoop_mirror);
        settings.spark_mirror = self.spark_mirror.or(settings.spark_mirror);
        settings
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    setup_logging();
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => load_settings(path)?,
        None => load_user_settings()?,
    };
    let (dry_run, json) = (args.dry_run, args.json);
    let settings = args.apply(loaded);
    let config = settings.into_config();

    if dry_run {
        for entry in &config.plan()? {
            println!("{} -> {}", entry.source_url, entry.dest_path.display());
        }
        return Ok(());
    }

    let report = ensure_pre_downloads(&config).context("pre-fetch failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    let failed = report.failures().count();
    tracing::info!(
        available = report.outcomes().len() - failed,
        failed,
        "pre-fetch finished"
    );
    Ok(())
}
