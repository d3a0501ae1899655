#![allow(clippy::field_reassign_with_default)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use litharvest::pipeline::{DatasetRecord, DiscoveryPipeline, PublicationStatus, RunOptions};
use litharvest::registry::FileRegistry;
use litharvest::{Config, ConfigOverrides, IdentifierSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "litharvest")]
#[command(about = "Full-text and citation discovery for biomedical dataset publications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Set environment profile (development, production)
    #[arg(long)]
    profile: Option<String>,

    /// Override download directory path
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Override cache directory path
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the validated full text of one publication
    Fetch {
        #[arg(long)]
        pmid: Option<String>,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        pmcid: Option<String>,
        /// Title fallback when no identifier is known
        #[arg(long)]
        title: Option<String>,
    },
    /// Discover publications that cite a dataset or mention its accession
    Citations {
        /// Dataset accession (GSE..., PRJNA..., E-MTAB-...)
        accession: String,
        /// PMID of the dataset's primary publication
        #[arg(long)]
        pmid: Option<String>,
        /// DOI of the dataset's primary publication
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        from_year: Option<u32>,
        #[arg(long)]
        to_year: Option<u32>,
        /// Cap on returned papers
        #[arg(long)]
        max: Option<usize>,
    },
    /// Full discovery run: citations plus full text for every paper
    Run {
        /// Dataset accession; omit when using --input
        accession: Option<String>,
        #[arg(long)]
        pmid: Option<String>,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        from_year: Option<u32>,
        #[arg(long)]
        to_year: Option<u32>,
        #[arg(long)]
        max: Option<usize>,
        /// Skip citation discovery, fetch only the primary publication
        #[arg(long)]
        primary_only: bool,
        /// JSON file with an array of dataset records for batch processing
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// List configured source providers
    Sources,
    /// Check the health of every configured provider
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.clone().unwrap_or_else(|| {
        if cli.verbose {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    });
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = ConfigOverrides {
        log_level: cli.log_level.clone(),
        profile: cli.profile.clone(),
        download_directory: cli.download_dir.clone(),
        cache_directory: cli.cache_dir.clone(),
    };
    let config = Config::load_with_overrides(cli.config.as_deref(), &overrides)?;
    debug!("Configuration: {:#?}", config.safe_for_logging());

    let registry = FileRegistry::open(config.downloads.directory.join("registry.json"))
        .context("Failed to open publication registry")?;
    let pipeline = Arc::new(
        DiscoveryPipeline::new(config, Box::new(registry))
            .await
            .context("Failed to initialize pipeline")?,
    );

    match cli.command {
        Commands::Fetch {
            pmid,
            doi,
            pmcid,
            title,
        } => {
            let ids = IdentifierSet::new(
                pmid.as_deref(),
                doi.as_deref(),
                pmcid.as_deref(),
                None,
                title.as_deref(),
            );
            if ids.is_empty() {
                bail!("At least one of --pmid, --doi, --pmcid or --title is required");
            }
            let accession = ids
                .filename()
                .unwrap_or_else(|| "publication".to_string());
            let record = DatasetRecord::new(accession, ids);
            let options = RunOptions {
                primary_only: true,
                ..RunOptions::default()
            };
            let report = pipeline.run_dataset(&record, &options).await?;
            print_report(&report.manifest.publications);
            if report.manifest.summary.succeeded == 0 {
                bail!("No validated full text could be retrieved");
            }
        }
        Commands::Citations {
            accession,
            pmid,
            doi,
            from_year,
            to_year,
            max,
        } => {
            let record = DatasetRecord::new(
                accession,
                IdentifierSet::new(pmid.as_deref(), doi.as_deref(), None, None, None),
            );
            let options = RunOptions {
                year_window: year_window(from_year, to_year),
                max_citations: max,
                primary_only: false,
            };
            let hits = pipeline.discover_citations(&record, &options).await;
            info!("Found {} citing papers for {}", hits.len(), record.accession);
            for hit in &hits {
                println!(
                    "{}\t{}\t{}\t{:?}",
                    hit.publication.identifiers.canonical_key(),
                    hit.publication.year.map_or("????".to_string(), |y| y.to_string()),
                    hit.publication.citation_count.unwrap_or(0),
                    hit.provenance,
                );
            }
        }
        Commands::Run {
            accession,
            pmid,
            doi,
            from_year,
            to_year,
            max,
            primary_only,
            input,
        } => {
            let records = match (input, accession) {
                (Some(path), _) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str::<Vec<DatasetRecord>>(&raw)
                        .context("Input must be a JSON array of dataset records")?
                }
                (None, Some(accession)) => vec![DatasetRecord::new(
                    accession,
                    IdentifierSet::new(pmid.as_deref(), doi.as_deref(), None, None, None),
                )],
                (None, None) => bail!("Provide an accession or --input"),
            };

            let options = RunOptions {
                year_window: year_window(from_year, to_year),
                max_citations: max,
                primary_only,
            };
            for record in &records {
                let report = pipeline.run_dataset(record, &options).await?;
                println!(
                    "{}: {}/{} fetched, manifest at {}",
                    record.accession,
                    report.manifest.summary.succeeded,
                    report.manifest.summary.attempted,
                    report.run_dir.join("manifest.json").display(),
                );
            }
        }
        Commands::Sources => {
            for (name, description, priority) in pipeline.collector().provider_info() {
                println!("{priority:>3}  {name:<16} {description}");
            }
        }
        Commands::Health => {
            let statuses = pipeline.collector().health_check().await;
            let mut names: Vec<_> = statuses.keys().collect();
            names.sort();
            for name in names {
                let state = if statuses[name] { "ok" } else { "unreachable" };
                println!("{name:<16} {state}");
            }
        }
    }
    Ok(())
}

fn year_window(from: Option<u32>, to: Option<u32>) -> Option<(u32, u32)> {
    match (from, to) {
        (None, None) => None,
        (from, to) => Some((from.unwrap_or(1900), to.unwrap_or(9999))),
    }
}

fn print_report(entries: &[litharvest::pipeline::ManifestEntry]) {
    for entry in entries {
        match (&entry.status, &entry.artifact_path) {
            (PublicationStatus::Fetched | PublicationStatus::CacheHit, Some(path)) => {
                println!("{}\t{}", entry.canonical_key, path.display());
            }
            _ => println!(
                "{}\tfailed after {} attempts",
                entry.canonical_key, entry.attempts
            ),
        }
    }
}
