//! # Citation Discovery Module
//!
//! Finds publications that cite a dataset's primary paper or mention its
//! accession number in text. Two strategies run concurrently:
//!
//! - **Strategy A** ([`CitationGraphStrategy`]): walk the citation graph of
//!   the dataset's primary publication through a provider fallback chain.
//! - **Strategy B** ([`MentionSearchStrategy`]): full-text search for the
//!   literal accession string, which catches papers that use a dataset
//!   without citing its marker paper.
//!
//! Results are merged as a set union keyed on canonical identifiers, with
//! per-strategy provenance preserved. A strategy failure degrades to zero
//! results from that strategy; the other still counts.

pub mod graph;
pub mod mentions;

pub use graph::CitationGraphStrategy;
pub use mentions::MentionSearchStrategy;

use crate::client::providers::{CollectContext, ProviderError};
use crate::client::Publication;
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One citation discovery request.
#[derive(Debug, Clone)]
pub struct CitationQuery {
    /// Dataset accession (GSE, PRJNA, E-MTAB, ...), searched literally.
    pub accession: String,
    /// Identifiers of the dataset's primary publication, when known.
    pub seed: IdentifierSet,
    /// Inclusive publication-year window.
    pub year_window: Option<(u32, u32)>,
    /// Cap on returned results, applied after ranking.
    pub max_results: Option<usize>,
}

impl CitationQuery {
    pub fn new(accession: impl Into<String>, seed: IdentifierSet) -> Self {
        Self {
            accession: accession.into(),
            seed,
            year_window: None,
            max_results: None,
        }
    }
}

/// Which strategy (or strategies) produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    CitationGraph,
    TextualMention,
    Both,
}

impl Provenance {
    fn union(self, other: Provenance) -> Provenance {
        if self == other {
            self
        } else {
            Provenance::Both
        }
    }
}

/// One discovered citing publication with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationHit {
    pub publication: Publication,
    pub provenance: Provenance,
}

/// A discovery strategy. Implementations degrade gracefully: an upstream
/// failure maps to a [`ProviderError`], never a panic, and the engine treats
/// it as zero hits from that strategy.
#[async_trait]
pub trait CitationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn discover(
        &self,
        query: &CitationQuery,
        context: &CollectContext,
    ) -> Result<Vec<Publication>, ProviderError>;
}

/// Runs both strategies concurrently and merges their results.
pub struct CitationEngine {
    graph: Arc<dyn CitationStrategy>,
    mentions: Arc<dyn CitationStrategy>,
}

impl CitationEngine {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            graph: Arc::new(CitationGraphStrategy::new(http)?),
            mentions: Arc::new(MentionSearchStrategy::new(http)?),
        })
    }

    /// Test seam: explicit strategy implementations.
    pub fn with_strategies(
        graph: Arc<dyn CitationStrategy>,
        mentions: Arc<dyn CitationStrategy>,
    ) -> Self {
        Self { graph, mentions }
    }

    /// Discover citing publications for the query.
    ///
    /// Both strategies run concurrently; their results are unioned, deduped
    /// on identifier overlap, optionally filtered to the year window, ranked
    /// by citation count then recency, and capped.
    pub async fn discover(&self, query: &CitationQuery, context: &CollectContext) -> Vec<CitationHit> {
        let (graph_result, mention_result) = tokio::join!(
            self.graph.discover(query, context),
            self.mentions.discover(query, context),
        );

        let graph_hits = match graph_result {
            Ok(publications) => publications,
            Err(e) => {
                warn!("Citation graph strategy failed: {}, continuing with mentions", e);
                Vec::new()
            }
        };
        let mention_hits = match mention_result {
            Ok(publications) => publications,
            Err(e) => {
                warn!("Mention search strategy failed: {}, continuing with graph", e);
                Vec::new()
            }
        };

        info!(
            "Citation discovery for {}: {} graph hits, {} mention hits",
            query.accession,
            graph_hits.len(),
            mention_hits.len()
        );

        let mut merged: Vec<CitationHit> = Vec::new();
        merge_into(&mut merged, graph_hits, Provenance::CitationGraph);
        merge_into(&mut merged, mention_hits, Provenance::TextualMention);

        restrict(merged, query.year_window, query.max_results)
    }
}

/// Apply a year window and result cap to an already merged hit list,
/// ranked by citation count then recency. Callers that cache the merged
/// set apply this per query, after the cache read.
pub fn restrict(
    mut hits: Vec<CitationHit>,
    year_window: Option<(u32, u32)>,
    max_results: Option<usize>,
) -> Vec<CitationHit> {
    if let Some((from, to)) = year_window {
        // Records without a known year survive the filter; a missing
        // year is uncertainty, not evidence of being out of range.
        hits.retain(|hit| match hit.publication.year {
            Some(year) => year >= from && year <= to,
            None => true,
        });
    }

    rank(&mut hits);

    if let Some(cap) = max_results {
        hits.truncate(cap);
    }
    hits
}

/// Union a strategy's results into the accumulator. A record that overlaps
/// an existing hit on any identifier enriches it and widens provenance;
/// otherwise it is appended as a new hit.
fn merge_into(accumulator: &mut Vec<CitationHit>, publications: Vec<Publication>, provenance: Provenance) {
    for publication in publications {
        if publication.identifiers.is_empty() {
            continue;
        }
        if let Some(existing) = accumulator
            .iter_mut()
            .find(|hit| hit.publication.identifiers.overlaps(&publication.identifiers))
        {
            existing.publication.enrich(publication);
            existing.provenance = existing.provenance.union(provenance);
        } else {
            accumulator.push(CitationHit {
                publication,
                provenance,
            });
        }
    }
}

/// Rank by citation count, then publication year, newest first. Stable, so
/// equal records keep their merge order.
fn rank(hits: &mut [CitationHit]) {
    hits.sort_by_key(|hit| {
        (
            std::cmp::Reverse(hit.publication.citation_count.unwrap_or(0)),
            std::cmp::Reverse(hit.publication.year.unwrap_or(0)),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rate_limiter::RateLimiter;
    use std::time::Duration;

    struct StaticStrategy {
        name: &'static str,
        publications: Vec<Publication>,
        fail: bool,
    }

    #[async_trait]
    impl CitationStrategy for StaticStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn discover(
            &self,
            _query: &CitationQuery,
            _context: &CollectContext,
        ) -> Result<Vec<Publication>, ProviderError> {
            if self.fail {
                return Err(ProviderError::ServiceUnavailable("down".to_string()));
            }
            Ok(self.publications.clone())
        }
    }

    fn test_context() -> CollectContext {
        CollectContext::new(
            Duration::from_secs(5),
            "test-agent/1.0",
            Arc::new(RateLimiter::new(Duration::from_millis(1))),
        )
    }

    fn publication(pmid: Option<&str>, doi: Option<&str>, year: u32, citations: u64) -> Publication {
        let mut p = Publication::new(IdentifierSet::new(pmid, doi, None, None, None));
        p.year = Some(year);
        p.citation_count = Some(citations);
        p
    }

    fn engine(graph: Vec<Publication>, mentions: Vec<Publication>) -> CitationEngine {
        CitationEngine::with_strategies(
            Arc::new(StaticStrategy {
                name: "graph",
                publications: graph,
                fail: false,
            }),
            Arc::new(StaticStrategy {
                name: "mentions",
                publications: mentions,
                fail: false,
            }),
        )
    }

    #[tokio::test]
    async fn test_union_preserves_both_strategies() {
        let engine = engine(
            vec![publication(Some("111"), None, 2021, 5)],
            vec![publication(Some("222"), None, 2022, 2)],
        );
        let hits = engine
            .discover(
                &CitationQuery::new("GSE123", IdentifierSet::from_pmid("999")),
                &test_context(),
            )
            .await;
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_hits_merge_with_both_provenance() {
        let shared_doi = "10.1093/nar/gkaa1000";
        let engine = engine(
            vec![publication(Some("111"), Some(shared_doi), 2021, 5)],
            vec![publication(None, Some(shared_doi), 2021, 0)],
        );
        let hits = engine
            .discover(
                &CitationQuery::new("GSE123", IdentifierSet::from_pmid("999")),
                &test_context(),
            )
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provenance, Provenance::Both);
        assert_eq!(hits[0].publication.identifiers.pmid.as_deref(), Some("111"));
    }

    #[tokio::test]
    async fn test_strategy_failure_degrades_to_other_strategy() {
        let engine = CitationEngine::with_strategies(
            Arc::new(StaticStrategy {
                name: "graph",
                publications: vec![],
                fail: true,
            }),
            Arc::new(StaticStrategy {
                name: "mentions",
                publications: vec![publication(Some("24651512"), None, 2014, 40)],
                fail: false,
            }),
        );
        let hits = engine
            .discover(
                &CitationQuery::new("GSE52564", IdentifierSet::default()),
                &test_context(),
            )
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provenance, Provenance::TextualMention);
    }

    #[tokio::test]
    async fn test_ranking_and_cap() {
        let engine = engine(
            vec![
                publication(Some("1"), None, 2019, 10),
                publication(Some("2"), None, 2023, 50),
                publication(Some("3"), None, 2024, 10),
            ],
            vec![],
        );
        let mut query = CitationQuery::new("GSE1", IdentifierSet::default());
        query.max_results = Some(2);
        let hits = engine.discover(&query, &test_context()).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].publication.identifiers.pmid.as_deref(), Some("2"));
        // Tie on citation count broken by recency.
        assert_eq!(hits[1].publication.identifiers.pmid.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_year_window_keeps_unknown_years() {
        let mut unknown = publication(Some("4"), None, 2000, 1);
        unknown.year = None;
        let engine = engine(
            vec![
                publication(Some("1"), None, 2018, 1),
                publication(Some("2"), None, 2021, 1),
                unknown,
            ],
            vec![],
        );
        let mut query = CitationQuery::new("GSE1", IdentifierSet::default());
        query.year_window = Some((2020, 2024));
        let hits = engine.discover(&query, &test_context()).await;
        let pmids: Vec<_> = hits
            .iter()
            .filter_map(|h| h.publication.identifiers.pmid.as_deref())
            .collect();
        assert!(pmids.contains(&"2"));
        assert!(pmids.contains(&"4"));
        assert!(!pmids.contains(&"1"));
    }
}
