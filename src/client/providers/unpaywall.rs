use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Unpaywall API response for a DOI lookup
#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[allow(dead_code)]
    doi: String,
    #[serde(rename = "is_oa")]
    is_open_access: bool,
    best_oa_location: Option<OaLocation>,
    oa_locations: Option<Vec<OaLocation>>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url: Option<String>,
    url_for_pdf: Option<String>,
    url_for_landing_page: Option<String>,
}

/// Unpaywall provider for open-access locations of a DOI.
///
/// Unpaywall is the one source with an authoritative open-access flag: a
/// record with `is_oa == false` is dropped here even when locations carry
/// URLs, so paywalled links never reach the classifier.
pub struct UnpaywallProvider {
    client: Client,
    base_url: String,
    email: String,
}

impl UnpaywallProvider {
    /// Create a new Unpaywall provider.
    /// Requires an email address as per Unpaywall API terms.
    pub fn new(http: &HttpSettings, email: String) -> Result<Self, ProviderError> {
        if email.is_empty() || !email.contains('@') {
            return Err(ProviderError::Auth(
                "Valid email address required for Unpaywall API".to_string(),
            ));
        }

        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://api.unpaywall.org".to_string(),
            email,
        })
    }

    /// Build Unpaywall DOI lookup URL
    fn build_doi_url(&self, doi: &str) -> String {
        format!(
            "{}/v2/{}?email={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(&self.email)
        )
    }

    /// Walk every OA location, best first, and emit one candidate per
    /// distinct URL. PDF URLs are preferred but landing-page URLs are kept
    /// as lower-value candidates for the classifier to sort out.
    fn candidates_from_response(&self, response: UnpaywallResponse) -> Vec<SourceCandidate> {
        if !response.is_open_access {
            debug!("Unpaywall record is not open access, dropping all locations");
            return Vec::new();
        }

        let mut locations = Vec::new();
        if let Some(best) = response.best_oa_location {
            locations.push(best);
        }
        locations.extend(response.oa_locations.unwrap_or_default());

        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();
        for location in &locations {
            for url in [
                location.url_for_pdf.as_ref(),
                location.url.as_ref(),
                location.url_for_landing_page.as_ref(),
            ]
            .into_iter()
            .flatten()
            {
                if url.is_empty() || !seen.insert(url.clone()) {
                    continue;
                }
                candidates.push(SourceCandidate::new(url.clone(), self.name(), self.priority()));
            }
        }
        candidates
    }
}

#[async_trait]
impl SourceProvider for UnpaywallProvider {
    fn name(&self) -> &'static str {
        "unpaywall"
    }

    fn description(&self) -> &'static str {
        "Unpaywall - database of legal open access locations"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(200)
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        let Some(doi) = ids.doi.as_deref() else {
            return Ok(Vec::new()); // Unpaywall only supports DOI lookups
        };

        context.rate_limiter.acquire(self.name()).await;

        let url = self.build_doi_url(doi);
        debug!("Querying Unpaywall: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        match response.status().as_u16() {
            404 => {
                debug!("DOI not found in Unpaywall: {}", doi);
                return Ok(Vec::new());
            }
            429 => return Err(ProviderError::RateLimit),
            status if status >= 400 => {
                return Err(ProviderError::Network(format!(
                    "API request failed with status: {status}"
                )));
            }
            _ => {}
        }

        let body: UnpaywallResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Unpaywall response for {}", doi);
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        Ok(self.candidates_from_response(body))
    }

    async fn health_check(&self, _context: &CollectContext) -> Result<bool, ProviderError> {
        let test_url = self.build_doi_url("10.1038/nature12373");
        match self.client.get(&test_url).send().await {
            Ok(response) if response.status().is_success() || response.status().as_u16() == 404 => {
                Ok(true)
            }
            Ok(response) => {
                warn!("Unpaywall health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Unpaywall health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
