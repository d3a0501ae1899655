use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// NCBI ID converter response
#[derive(Debug, Deserialize)]
struct IdConvResponse {
    records: Option<Vec<IdConvRecord>>,
}

#[derive(Debug, Deserialize)]
struct IdConvRecord {
    #[serde(rename = "pmcid")]
    pmc_id: Option<String>,
    #[allow(dead_code)]
    doi: Option<String>,
    /// Present when the article is not in PMC ("invalid article id" etc.)
    status: Option<String>,
}

/// PubMed Central provider.
///
/// PMC provides free full text for deposited biomedical articles. The
/// provider-specific knowledge here is the PMID-to-PMCID resolution step:
/// a dataset usually links a PMID, while every useful PMC URL is keyed by
/// PMCID, so the NCBI ID converter is consulted first when needed.
pub struct PubMedCentralProvider {
    client: Client,
    idconv_url: String,
}

impl PubMedCentralProvider {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            idconv_url: "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/".to_string(),
        })
    }

    fn build_idconv_url(&self, id: &str) -> String {
        format!(
            "{}?ids={}&format=json&tool=litharvest&email=litharvest@example.org",
            self.idconv_url,
            urlencoding::encode(id)
        )
    }

    /// Resolve a PMID or DOI to a PMCID through the NCBI ID converter.
    async fn resolve_pmcid(
        &self,
        id: &str,
        context: &CollectContext,
    ) -> Result<Option<String>, ProviderError> {
        context.rate_limiter.acquire(self.name()).await;

        let url = self.build_idconv_url(id);
        debug!("Resolving PMCID via ID converter: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("ID converter request failed: {e}")))?;

        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimit);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "ID converter failed with status: {}",
                response.status()
            )));
        }

        let body: IdConvResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse ID converter JSON: {e}")))?;

        let pmcid = body
            .records
            .unwrap_or_default()
            .into_iter()
            .find(|r| r.status.is_none())
            .and_then(|r| r.pmc_id);

        if pmcid.is_none() {
            debug!("Article {} is not deposited in PMC", id);
        }
        Ok(pmcid)
    }

    /// Candidate URLs for a known PMCID: the PDF endpoint, the Europe PMC
    /// PDF render, and the HTML article view as fallback.
    fn candidates_for_pmcid(&self, pmcid: &str) -> Vec<SourceCandidate> {
        vec![
            SourceCandidate::new(
                format!("https://pmc.ncbi.nlm.nih.gov/articles/{pmcid}/pdf/"),
                self.name(),
                self.priority(),
            ),
            SourceCandidate::new(
                format!("https://europepmc.org/articles/{pmcid}?pdf=render"),
                self.name(),
                self.priority(),
            ),
            SourceCandidate::new(
                format!("https://pmc.ncbi.nlm.nih.gov/articles/{pmcid}/"),
                self.name(),
                self.priority(),
            ),
        ]
    }
}

#[async_trait]
impl SourceProvider for PubMedCentralProvider {
    fn name(&self) -> &'static str {
        "pmc"
    }

    fn description(&self) -> &'static str {
        "PubMed Central - free full-text biomedical articles"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(350) // NCBI asks for <= 3 requests per second
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        // A known PMCID skips the converter round-trip entirely.
        if let Some(pmcid) = ids.pmcid.as_deref() {
            return Ok(self.candidates_for_pmcid(pmcid));
        }

        let lookup = ids.pmid.as_deref().or(ids.doi.as_deref());
        let Some(lookup) = lookup else {
            return Ok(Vec::new());
        };

        match self.resolve_pmcid(lookup, context).await? {
            Some(pmcid) => Ok(self.candidates_for_pmcid(&pmcid)),
            None => Ok(Vec::new()),
        }
    }

    async fn health_check(&self, _context: &CollectContext) -> Result<bool, ProviderError> {
        let url = self.build_idconv_url("33199918");
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                warn!("PMC health check failed with status: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("PMC health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
