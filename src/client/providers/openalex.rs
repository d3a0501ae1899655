use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAlex work response, reduced to location data.
#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    open_access: Option<OpenAccessInfo>,
    best_oa_location: Option<WorkLocation>,
    primary_location: Option<WorkLocation>,
    #[serde(default)]
    locations: Vec<WorkLocation>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessInfo {
    is_oa: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WorkLocation {
    pdf_url: Option<String>,
    landing_page_url: Option<String>,
    is_oa: Option<bool>,
}

/// OpenAlex provider - free scholarly works index with per-location OA flags.
pub struct OpenAlexProvider {
    client: Client,
    base_url: String,
}

impl OpenAlexProvider {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://api.openalex.org".to_string(),
        })
    }

    /// OpenAlex resolves works by namespaced external IDs.
    fn build_work_url(&self, ids: &IdentifierSet) -> Option<String> {
        if let Some(pmid) = &ids.pmid {
            return Some(format!("{}/works/pmid:{}", self.base_url, pmid));
        }
        ids.doi
            .as_ref()
            .map(|doi| format!("{}/works/doi:{}", self.base_url, doi))
    }

    /// Emit candidates from every open-access location. Locations flagged
    /// not-OA are filtered here; OpenAlex happily lists paywalled publisher
    /// locations alongside repository copies.
    fn candidates_from_work(&self, work: OpenAlexWork) -> Vec<SourceCandidate> {
        if work.open_access.as_ref().and_then(|oa| oa.is_oa) == Some(false) {
            debug!("OpenAlex work is not open access, dropping locations");
            return Vec::new();
        }

        let mut locations = Vec::new();
        if let Some(best) = work.best_oa_location {
            locations.push(best);
        }
        if let Some(primary) = work.primary_location {
            locations.push(primary);
        }
        locations.extend(work.locations);

        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();
        for location in locations {
            if location.is_oa == Some(false) {
                continue;
            }
            for url in [location.pdf_url, location.landing_page_url]
                .into_iter()
                .flatten()
            {
                if url.is_empty() || !seen.insert(url.clone()) {
                    continue;
                }
                candidates.push(SourceCandidate::new(url, self.name(), self.priority()));
            }
        }
        candidates
    }
}

#[async_trait]
impl SourceProvider for OpenAlexProvider {
    fn name(&self) -> &'static str {
        "openalex"
    }

    fn description(&self) -> &'static str {
        "OpenAlex - open index of scholarly works and locations"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(150)
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        let Some(url) = self.build_work_url(ids) else {
            return Ok(Vec::new());
        };

        context.rate_limiter.acquire(self.name()).await;
        debug!("Querying OpenAlex: {}", url);

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

        let work: OpenAlexWork = response.json().await.map_err(|e| {
            warn!("Failed to parse OpenAlex work response");
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        Ok(self.candidates_from_work(work))
    }
}
