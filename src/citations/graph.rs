//! Strategy A: citation-graph traversal with a provider fallback chain.
//!
//! OpenAlex is asked first for the works citing the seed publication. If it
//! errors or returns nothing, Semantic Scholar is tried. If that also comes
//! up empty, Crossref is consulted for the citation count alone; Crossref
//! exposes no citing-work list, so the chain ends with metrics and zero
//! hits rather than an error.

use super::{CitationQuery, CitationStrategy};
use crate::client::providers::{CollectContext, ProviderError};
use crate::client::Publication;
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct OpenAlexWorkStub {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexCitesResponse {
    #[serde(default)]
    results: Vec<OpenAlexCitingWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexCitingWork {
    doi: Option<String>,
    title: Option<String>,
    publication_year: Option<u32>,
    cited_by_count: Option<u64>,
    #[serde(default)]
    ids: OpenAlexIds,
    #[serde(default)]
    authorships: Vec<OpenAlexAuthorship>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAlexIds {
    pmid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SemanticScholarCitations {
    #[serde(default)]
    data: Vec<SemanticScholarEntry>,
}

#[derive(Debug, Deserialize)]
struct SemanticScholarEntry {
    #[serde(rename = "citingPaper")]
    citing_paper: Option<SemanticScholarPaper>,
}

#[derive(Debug, Deserialize)]
struct SemanticScholarPaper {
    #[serde(rename = "externalIds", default)]
    external_ids: SemanticScholarExternalIds,
    title: Option<String>,
    year: Option<u32>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(default)]
    authors: Vec<SemanticScholarAuthor>,
}

#[derive(Debug, Default, Deserialize)]
struct SemanticScholarExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SemanticScholarAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u64>,
}

/// Citation-graph strategy over OpenAlex, Semantic Scholar and Crossref.
pub struct CitationGraphStrategy {
    client: Client,
    openalex_base: String,
    semantic_scholar_base: String,
    crossref_base: String,
}

impl CitationGraphStrategy {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            openalex_base: "https://api.openalex.org".to_string(),
            semantic_scholar_base: "https://api.semanticscholar.org".to_string(),
            crossref_base: "https://api.crossref.org".to_string(),
        })
    }

    /// Test seam: point every upstream at local servers.
    pub fn with_base_urls(
        openalex_base: impl Into<String>,
        semantic_scholar_base: impl Into<String>,
        crossref_base: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let mut strategy = Self::new(&HttpSettings::default())?;
        strategy.openalex_base = openalex_base.into();
        strategy.semantic_scholar_base = semantic_scholar_base.into();
        strategy.crossref_base = crossref_base.into();
        Ok(strategy)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ProviderError> {
        debug!("Querying citation graph: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        match response.status().as_u16() {
            404 => return Ok(None),
            429 => return Err(ProviderError::RateLimit),
            status if status >= 400 => {
                return Err(ProviderError::Network(format!(
                    "API request failed with status: {status}"
                )));
            }
            _ => {}
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse JSON: {e}")))?;
        Ok(Some(parsed))
    }

    /// Resolve the seed publication to an OpenAlex work ID (the `W...` tail
    /// of the work URI).
    async fn resolve_openalex_id(
        &self,
        seed: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Option<String>, ProviderError> {
        let lookup = if let Some(pmid) = &seed.pmid {
            format!("{}/works/pmid:{}", self.openalex_base, pmid)
        } else if let Some(doi) = &seed.doi {
            format!("{}/works/doi:{}", self.openalex_base, doi)
        } else {
            return Ok(None);
        };

        context.rate_limiter.acquire("openalex").await;
        let Some(stub) = self.get_json::<OpenAlexWorkStub>(&lookup).await? else {
            return Ok(None);
        };
        Ok(stub
            .id
            .as_deref()
            .and_then(|uri| uri.rsplit('/').next())
            .map(str::to_string))
    }

    async fn openalex_citations(
        &self,
        seed: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<Publication>, ProviderError> {
        let Some(work_id) = self.resolve_openalex_id(seed, context).await? else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/works?filter=cites:{}&per-page=200",
            self.openalex_base, work_id
        );
        context.rate_limiter.acquire("openalex").await;
        let Some(response) = self.get_json::<OpenAlexCitesResponse>(&url).await? else {
            return Ok(Vec::new());
        };
        Ok(response
            .results
            .into_iter()
            .filter_map(openalex_work_to_publication)
            .collect())
    }

    async fn semantic_scholar_citations(
        &self,
        seed: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<Publication>, ProviderError> {
        let paper_id = if let Some(pmid) = &seed.pmid {
            format!("PMID:{pmid}")
        } else if let Some(doi) = &seed.doi {
            format!("DOI:{doi}")
        } else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/graph/v1/paper/{}/citations?fields=externalIds,title,year,citationCount,authors&limit=100",
            self.semantic_scholar_base, paper_id
        );
        context.rate_limiter.acquire("semantic_scholar").await;
        let Some(response) = self.get_json::<SemanticScholarCitations>(&url).await? else {
            return Ok(Vec::new());
        };
        Ok(response
            .data
            .into_iter()
            .filter_map(|entry| entry.citing_paper)
            .filter_map(semantic_scholar_paper_to_publication)
            .collect())
    }

    /// Crossref exposes only the citation count, not the citing works. The
    /// count goes to the log so an operator can tell "no citations" from
    /// "citations exist but no graph provider could list them".
    async fn crossref_citation_count(
        &self,
        seed: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Option<u64>, ProviderError> {
        let Some(doi) = &seed.doi else {
            return Ok(None);
        };
        let url = format!("{}/works/{}", self.crossref_base, doi);
        context.rate_limiter.acquire("crossref").await;
        let Some(response) = self.get_json::<CrossrefResponse>(&url).await? else {
            return Ok(None);
        };
        Ok(response.message.is_referenced_by_count)
    }
}

fn openalex_work_to_publication(work: OpenAlexCitingWork) -> Option<Publication> {
    let ids = IdentifierSet::new(
        work.ids.pmid.as_deref().and_then(trailing_digits),
        work.doi.as_deref(),
        None,
        None,
        work.title.as_deref(),
    );
    if ids.is_empty() {
        return None;
    }
    let mut publication = Publication::new(ids);
    publication.year = work.publication_year;
    publication.citation_count = work.cited_by_count;
    publication.authors = work
        .authorships
        .into_iter()
        .filter_map(|a| a.author.and_then(|author| author.display_name))
        .collect();
    Some(publication)
}

fn semantic_scholar_paper_to_publication(paper: SemanticScholarPaper) -> Option<Publication> {
    let ids = IdentifierSet::new(
        paper.external_ids.pubmed.as_deref(),
        paper.external_ids.doi.as_deref(),
        None,
        None,
        paper.title.as_deref(),
    );
    if ids.is_empty() {
        return None;
    }
    let mut publication = Publication::new(ids);
    publication.year = paper.year;
    publication.citation_count = paper.citation_count;
    publication.authors = paper
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .collect();
    Some(publication)
}

/// OpenAlex renders external IDs as URIs; the PMID is the trailing path
/// segment of a pubmed.ncbi.nlm.nih.gov URL.
fn trailing_digits(uri: &str) -> Option<&str> {
    let tail = uri.trim_end_matches('/').rsplit('/').next()?;
    (!tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit())).then_some(tail)
}

#[async_trait]
impl CitationStrategy for CitationGraphStrategy {
    fn name(&self) -> &'static str {
        "citation_graph"
    }

    async fn discover(
        &self,
        query: &CitationQuery,
        context: &CollectContext,
    ) -> Result<Vec<Publication>, ProviderError> {
        if query.seed.is_empty() {
            debug!("No seed publication for {}, skipping citation graph", query.accession);
            return Ok(Vec::new());
        }

        match self.openalex_citations(&query.seed, context).await {
            Ok(publications) if !publications.is_empty() => {
                debug!("OpenAlex returned {} citing works", publications.len());
                return Ok(publications);
            }
            Ok(_) => debug!("OpenAlex returned no citing works, trying Semantic Scholar"),
            Err(e) => warn!("OpenAlex citation lookup failed: {}, trying Semantic Scholar", e),
        }

        match self.semantic_scholar_citations(&query.seed, context).await {
            Ok(publications) if !publications.is_empty() => {
                debug!("Semantic Scholar returned {} citing works", publications.len());
                return Ok(publications);
            }
            Ok(_) => debug!("Semantic Scholar returned no citing works"),
            Err(e) => warn!("Semantic Scholar citation lookup failed: {}", e),
        }

        match self.crossref_citation_count(&query.seed, context).await {
            Ok(Some(count)) => info!(
                "Crossref reports {} citations for {}; no provider could list them",
                count,
                query.seed.canonical_key()
            ),
            Ok(None) => {}
            Err(e) => warn!("Crossref citation-count lookup failed: {}", e),
        }
        Ok(Vec::new())
    }
}
