//! # Discovery Pipeline
//!
//! End-to-end orchestration for one dataset accession: discover citing
//! publications, collect candidate URLs, run the download waterfall, and
//! record everything in a run directory, the tiered cache, and the durable
//! registry.
//!
//! ## Run layout
//!
//! ```text
//! {downloads.directory}/{accession}_{timestamp}/
//!   manifest.json
//!   artifacts/
//!     pmid_33199918.pdf
//!     doi_10.1038_xxx.pdf
//! ```
//!
//! ## Failure escalation
//!
//! A candidate failure stays inside the waterfall; an exhausted publication
//! is recorded and the batch continues; only setup failures (run directory,
//! manifest write) fail the run itself.

use crate::cache::TieredCache;
use crate::citations::{self, CitationEngine, CitationHit, CitationQuery, Provenance};
use crate::client::{CandidateCollector, Publication};
use crate::fetch::FetchEngine;
use crate::identity::IdentifierSet;
use crate::registry::Registry;
use crate::{Config, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// One dataset to process: the accession plus whatever identifiers are
/// known for its primary publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub accession: String,
    #[serde(default)]
    pub identifiers: IdentifierSet,
}

impl DatasetRecord {
    pub fn new(accession: impl Into<String>, identifiers: IdentifierSet) -> Self {
        Self {
            accession: accession.into(),
            identifiers,
        }
    }
}

/// Options for one run, layered over the configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Inclusive publication-year window for citing papers.
    pub year_window: Option<(u32, u32)>,
    /// Cap on citing papers; defaults to `citations.max_results`.
    pub max_citations: Option<usize>,
    /// Skip citation discovery and fetch only the primary publication.
    pub primary_only: bool,
}

/// Terminal state of one publication within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    /// Validated artifact downloaded this run.
    Fetched,
    /// Answered from the cache or a prior run's artifact, zero network.
    CacheHit,
    /// Every candidate failed; attempt log preserved.
    Exhausted,
    /// No usable identifier, nothing to do.
    Skipped,
}

/// Attempted/succeeded/failed counts for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One publication's line in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub canonical_key: String,
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub status: PublicationStatus,
    pub artifact_path: Option<PathBuf>,
    pub attempts: usize,
}

/// Per-run manifest, written to `manifest.json` in the run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub accession: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub publications: Vec<ManifestEntry>,
}

/// What `run_dataset` hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub manifest: RunManifest,
}

/// Cached terminal state for one publication's full-text fetch. Both
/// success and exhaustion are cached, so a rerun performs no network work
/// either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FulltextRecord {
    status: PublicationStatus,
    artifact_path: Option<PathBuf>,
    content_hash: Option<String>,
    attempts: usize,
}

/// The discovery pipeline.
pub struct DiscoveryPipeline {
    config: Config,
    collector: CandidateCollector,
    engine: Arc<FetchEngine>,
    citations: CitationEngine,
    cache: TieredCache,
    registry: Box<dyn Registry>,
}

impl DiscoveryPipeline {
    pub async fn new(config: Config, registry: Box<dyn Registry>) -> Result<Self> {
        let collector = CandidateCollector::new(&config)?;
        collector
            .register_rate_limits(&config.rate_limiting.per_provider_ms)
            .await;

        let engine =
            Arc::new(FetchEngine::new(&config)?.with_rate_limiter(collector.rate_limiter()));
        let citations = CitationEngine::new(&config.http)
            .map_err(|e| Error::Service(format!("Failed to initialize citation engine: {e}")))?;
        let cache = TieredCache::new(
            config.cache_directory().join("warm"),
            std::time::Duration::from_secs(config.cache.hot_ttl_secs),
            std::time::Duration::from_secs(config.cache.warm_ttl_secs),
        )?;

        Ok(Self {
            config,
            collector,
            engine,
            citations,
            cache,
            registry,
        })
    }

    /// Test seam: explicit components.
    pub fn with_components(
        config: Config,
        collector: CandidateCollector,
        engine: Arc<FetchEngine>,
        citations: CitationEngine,
        cache: TieredCache,
        registry: Box<dyn Registry>,
    ) -> Self {
        Self {
            config,
            collector,
            engine,
            citations,
            cache,
            registry,
        }
    }

    pub fn collector(&self) -> &CandidateCollector {
        &self.collector
    }

    /// Process one dataset end to end.
    pub async fn run_dataset(
        self: &Arc<Self>,
        record: &DatasetRecord,
        options: &RunOptions,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_dir = self.create_run_dir(&record.accession, started_at)?;
        let artifacts_dir = run_dir.join("artifacts");
        tokio::fs::create_dir_all(&artifacts_dir).await?;
        info!(
            "Run started for {} in {}",
            record.accession,
            run_dir.display()
        );

        let hits = if options.primary_only {
            Vec::new()
        } else {
            self.discover_citations(record, options).await
        };

        // The primary publication is fetched alongside its citing papers,
        // merged when a strategy already rediscovered it.
        let mut publications: Vec<(Publication, Option<Provenance>)> = Vec::new();
        if !record.identifiers.is_empty() {
            publications.push((Publication::new(record.identifiers.clone()), None));
        }
        for hit in hits {
            if let Some((existing, _)) = publications
                .iter_mut()
                .find(|(p, _)| p.identifiers.overlaps(&hit.publication.identifiers))
            {
                existing.enrich(hit.publication);
            } else {
                publications.push((hit.publication, Some(hit.provenance)));
            }
        }

        let entries = self.process_all(publications, &artifacts_dir).await;

        let mut summary = BatchSummary::default();
        for entry in &entries {
            summary.attempted += 1;
            match entry.status {
                PublicationStatus::Fetched | PublicationStatus::CacheHit
                    if entry.artifact_path.is_some() =>
                {
                    summary.succeeded += 1;
                }
                _ => summary.failed += 1,
            }
        }

        let manifest = RunManifest {
            accession: record.accession.clone(),
            started_at,
            finished_at: Utc::now(),
            summary,
            publications: entries,
        };
        write_manifest(&run_dir, &manifest).await?;
        info!(
            "Run finished for {}: {}/{} publications fetched",
            record.accession, manifest.summary.succeeded, manifest.summary.attempted
        );

        Ok(RunReport { run_dir, manifest })
    }

    /// Citation discovery with its own cache entry per accession.
    ///
    /// The cache holds the unrestricted merged hit set; the year window and
    /// cap are applied per query, after the cache read, so a later query
    /// with a wider window is never answered with a narrowed subset.
    pub async fn discover_citations(
        self: &Arc<Self>,
        record: &DatasetRecord,
        options: &RunOptions,
    ) -> Vec<CitationHit> {
        let cap = Some(
            options
                .max_citations
                .unwrap_or(self.config.citations.max_results),
        );

        let cache_key = format!("citations:{}", record.accession);
        if let Some(hits) = self.cache.get_json::<Vec<CitationHit>>(&cache_key) {
            info!(
                "Citation cache hit for {}: {} papers",
                record.accession,
                hits.len()
            );
            return citations::restrict(hits, options.year_window, cap);
        }

        let query = CitationQuery::new(&record.accession, record.identifiers.clone());
        let hits = self
            .citations
            .discover(&query, self.collector.collect_context())
            .await;
        if let Err(e) = self.cache.put_json(&cache_key, &hits) {
            warn!("Failed to cache citation results: {}", e);
        }
        citations::restrict(hits, options.year_window, cap)
    }

    /// Fan out over publications, bounded by `downloads.max_concurrent`.
    /// Candidates within one publication remain strictly sequential inside
    /// the engine.
    async fn process_all(
        self: &Arc<Self>,
        publications: Vec<(Publication, Option<Provenance>)>,
        artifacts_dir: &Path,
    ) -> Vec<ManifestEntry> {
        let semaphore = Arc::new(Semaphore::new(self.config.downloads.max_concurrent));
        let tasks: Vec<_> = publications
            .into_iter()
            .map(|(publication, provenance)| {
                let pipeline = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let dir = artifacts_dir.to_path_buf();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await;
                    pipeline.process_one(publication, provenance, &dir).await
                })
            })
            .collect();

        let mut entries = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Publication task panicked: {}", e),
            }
        }
        entries
    }

    /// One publication through cache check, collection, waterfall, cache
    /// write and registry upsert.
    async fn process_one(
        &self,
        mut publication: Publication,
        provenance: Option<Provenance>,
        artifacts_dir: &Path,
    ) -> ManifestEntry {
        let key = publication.identifiers.canonical_key();
        let Some(filename) = publication.identifiers.filename() else {
            warn!("Publication without usable identifiers, skipping");
            return ManifestEntry {
                canonical_key: key,
                title: publication.title,
                provenance,
                status: PublicationStatus::Skipped,
                artifact_path: None,
                attempts: 0,
            };
        };

        let cache_key = format!("fulltext:{key}");
        if let Some(cached) = self.cache.get_json::<FulltextRecord>(&cache_key) {
            match cached.status {
                PublicationStatus::Fetched | PublicationStatus::CacheHit => {
                    let still_present = cached
                        .artifact_path
                        .as_ref()
                        .is_some_and(|path| path.exists());
                    if still_present {
                        debug!("Cache hit for {}, zero network work", key);
                        return ManifestEntry {
                            canonical_key: key,
                            title: publication.title,
                            provenance,
                            status: PublicationStatus::CacheHit,
                            artifact_path: cached.artifact_path,
                            attempts: 0,
                        };
                    }
                    // The artifact was deleted underneath the cache entry;
                    // fall through and fetch again.
                    warn!("Cached artifact missing for {}, refetching", key);
                }
                PublicationStatus::Exhausted => {
                    debug!("Cached exhaustion for {}, skipping refetch", key);
                    return ManifestEntry {
                        canonical_key: key,
                        title: publication.title,
                        provenance,
                        status: PublicationStatus::Exhausted,
                        artifact_path: None,
                        attempts: cached.attempts,
                    };
                }
                PublicationStatus::Skipped => {}
            }
        }

        publication.candidates = self.collector.collect(&publication.identifiers).await;

        let (status, artifact_path, content_hash) = match self
            .engine
            .fetch(&publication.candidates, &filename, artifacts_dir)
            .await
        {
            Ok(outcome) => {
                let succeeded = outcome.is_success();
                publication.attempts.extend(outcome.attempts);
                if outcome.from_cache {
                    (PublicationStatus::CacheHit, outcome.artifact_path, outcome.content_hash)
                } else if succeeded {
                    (PublicationStatus::Fetched, outcome.artifact_path, outcome.content_hash)
                } else {
                    (PublicationStatus::Exhausted, None, None)
                }
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", key, e);
                (PublicationStatus::Exhausted, None, None)
            }
        };
        publication.artifact_path = artifact_path.clone();

        let record = FulltextRecord {
            status,
            artifact_path: artifact_path.clone(),
            content_hash,
            attempts: publication.attempts.len(),
        };
        if let Err(e) = self.cache.put_json(&cache_key, &record) {
            warn!("Failed to cache fetch outcome for {}: {}", key, e);
        }

        match serde_json::to_value(&publication) {
            Ok(value) => {
                if let Err(e) = self.registry.upsert(&key, &value) {
                    warn!("Registry upsert failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize publication {}: {}", key, e),
        }

        ManifestEntry {
            canonical_key: key,
            title: publication.title,
            provenance,
            status,
            artifact_path,
            attempts: publication.attempts.len(),
        }
    }

    fn create_run_dir(&self, accession: &str, started_at: DateTime<Utc>) -> Result<PathBuf> {
        let stem = format!(
            "{}_{}",
            sanitize_accession(accession),
            started_at.format("%Y%m%d_%H%M%S")
        );
        let run_dir = self.config.downloads.directory.join(stem);
        std::fs::create_dir_all(&run_dir)?;
        Ok(run_dir)
    }
}

async fn write_manifest(run_dir: &Path, manifest: &RunManifest) -> Result<()> {
    let path = run_dir.join("manifest.json");
    let temp = run_dir.join("manifest.json.tmp");
    tokio::fs::write(&temp, serde_json::to_vec_pretty(manifest)?).await?;
    tokio::fs::rename(&temp, &path).await?;
    Ok(())
}

/// Accessions are usually clean (GSE..., PRJNA...), but the run directory
/// name must never contain path separators.
fn sanitize_accession(accession: &str) -> String {
    accession
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
