//! Strategy B: textual accession-mention search.
//!
//! Searches Europe PMC's full-text index for the literal accession string.
//! This finds papers that used a dataset without ever citing its marker
//! publication, which the citation graph cannot see.

use super::{CitationQuery, CitationStrategy};
use crate::client::providers::{CollectContext, ProviderError};
use crate::client::Publication;
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct EuropePmcSearchResponse {
    #[serde(rename = "resultList")]
    result_list: Option<EuropePmcResultList>,
}

#[derive(Debug, Deserialize)]
struct EuropePmcResultList {
    #[serde(default)]
    result: Vec<EuropePmcResult>,
}

#[derive(Debug, Deserialize)]
struct EuropePmcResult {
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    #[serde(rename = "authorString")]
    author_string: Option<String>,
    #[serde(rename = "journalTitle")]
    journal_title: Option<String>,
    #[serde(rename = "pubYear")]
    pub_year: Option<String>,
    #[serde(rename = "citedByCount")]
    cited_by_count: Option<u64>,
}

/// Accession-mention search over the Europe PMC REST API.
pub struct MentionSearchStrategy {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl MentionSearchStrategy {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string(),
            page_size: 100,
        })
    }

    /// Test seam: point the search at a local server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let mut strategy = Self::new(&HttpSettings::default())?;
        strategy.base_url = base_url.into();
        Ok(strategy)
    }

    /// The accession is quoted so Europe PMC matches it as a phrase rather
    /// than tokenizing it.
    fn build_search_url(&self, accession: &str) -> String {
        let query = format!("\"{accession}\"");
        format!(
            "{}/search?query={}&format=json&resultType=lite&pageSize={}",
            self.base_url,
            urlencoding::encode(&query),
            self.page_size
        )
    }
}

fn result_to_publication(result: EuropePmcResult) -> Option<Publication> {
    let ids = IdentifierSet::new(
        result.pmid.as_deref(),
        result.doi.as_deref(),
        result.pmcid.as_deref(),
        None,
        result.title.as_deref(),
    );
    if ids.is_empty() {
        return None;
    }
    let mut publication = Publication::new(ids);
    publication.venue = result.journal_title;
    publication.year = result.pub_year.as_deref().and_then(|y| y.parse().ok());
    publication.citation_count = result.cited_by_count;
    publication.authors = result
        .author_string
        .map(|authors| {
            authors
                .trim_end_matches('.')
                .split(", ")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(publication)
}

#[async_trait]
impl CitationStrategy for MentionSearchStrategy {
    fn name(&self) -> &'static str {
        "mention_search"
    }

    async fn discover(
        &self,
        query: &CitationQuery,
        context: &CollectContext,
    ) -> Result<Vec<Publication>, ProviderError> {
        let accession = query.accession.trim();
        if accession.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.build_search_url(accession);
        context.rate_limiter.acquire("europepmc").await;
        debug!("Searching Europe PMC for accession mention: {}", accession);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        match response.status().as_u16() {
            404 => return Ok(Vec::new()),
            429 => return Err(ProviderError::RateLimit),
            status if status >= 400 => {
                return Err(ProviderError::Network(format!(
                    "API request failed with status: {status}"
                )));
            }
            _ => {}
        }

        let parsed: EuropePmcSearchResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Europe PMC search response");
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        let publications: Vec<Publication> = parsed
            .result_list
            .map(|list| list.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(result_to_publication)
            .collect();
        debug!(
            "Europe PMC found {} papers mentioning {}",
            publications.len(),
            accession
        );
        Ok(publications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_quotes_accession() {
        let strategy = MentionSearchStrategy::new(&HttpSettings::default()).unwrap();
        let url = strategy.build_search_url("GSE52564");
        assert!(url.contains("query=%22GSE52564%22"));
        assert!(url.contains("format=json"));
    }

    #[test]
    fn test_result_parsing() {
        let response: EuropePmcSearchResponse = serde_json::from_str(
            r#"{
                "resultList": {
                    "result": [
                        {
                            "id": "24651512",
                            "pmid": "24651512",
                            "pmcid": "PMC4480640",
                            "doi": "10.1523/jneurosci.1860-14.2014",
                            "title": "An RNA-sequencing transcriptome of glia and neurons",
                            "authorString": "Zhang Y, Chen K, Sloan SA.",
                            "journalTitle": "J Neurosci",
                            "pubYear": "2014",
                            "citedByCount": 2400
                        },
                        {
                            "id": "MED00000",
                            "title": null
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let publications: Vec<Publication> = response
            .result_list
            .unwrap()
            .result
            .into_iter()
            .filter_map(result_to_publication)
            .collect();
        // The record with no usable identifier is dropped.
        assert_eq!(publications.len(), 1);
        let p = &publications[0];
        assert_eq!(p.identifiers.pmid.as_deref(), Some("24651512"));
        assert_eq!(p.identifiers.pmcid.as_deref(), Some("PMC4480640"));
        assert_eq!(p.year, Some(2014));
        assert_eq!(p.citation_count, Some(2400));
        assert_eq!(p.authors.len(), 3);
        assert_eq!(p.authors[2], "Sloan SA");
    }

    #[test]
    fn test_empty_result_list() {
        let response: EuropePmcSearchResponse =
            serde_json::from_str(r#"{"resultList": {"result": []}}"#).unwrap();
        assert!(response.result_list.unwrap().result.is_empty());
    }
}
