use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// CORE v3 output record, reduced to download locations.
#[derive(Debug, Deserialize)]
struct CoreOutput {
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
    #[serde(rename = "sourceFulltextUrls", default)]
    source_fulltext_urls: Vec<String>,
}

/// CORE provider - aggregated open-access repository content.
///
/// Works without an API key at a reduced rate; a key from config lifts the
/// limit. Everything CORE indexes is open access by construction, so there
/// is no OA flag to check here.
pub struct CoreProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoreProvider {
    pub fn new(http: &HttpSettings, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://api.core.ac.uk/v3".to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn build_doi_url(&self, doi: &str) -> String {
        format!("{}/outputs/doi/{}", self.base_url, urlencoding::encode(doi))
    }
}

#[async_trait]
impl SourceProvider for CoreProvider {
    fn name(&self) -> &'static str {
        "core"
    }

    fn description(&self) -> &'static str {
        "CORE - aggregator of open access repository outputs"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn base_delay(&self) -> Duration {
        // Anonymous access is tightly limited; keyed access can go faster.
        if self.api_key.is_some() {
            Duration::from_millis(500)
        } else {
            Duration::from_secs(2)
        }
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        let Some(doi) = ids.doi.as_deref() else {
            return Ok(Vec::new());
        };

        context.rate_limiter.acquire(self.name()).await;

        let url = self.build_doi_url(doi);
        debug!("Querying CORE: {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        match response.status().as_u16() {
            404 => return Ok(Vec::new()),
            401 | 403 => {
                return Err(ProviderError::Auth(
                    "CORE rejected the API key".to_string(),
                ))
            }
            429 => return Err(ProviderError::RateLimit),
            status if status >= 400 => {
                return Err(ProviderError::Network(format!(
                    "API request failed with status: {status}"
                )));
            }
            _ => {}
        }

        let output: CoreOutput = response.json().await.map_err(|e| {
            warn!("Failed to parse CORE output response");
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();
        for url in output
            .download_url
            .into_iter()
            .chain(output.source_fulltext_urls)
        {
            if url.is_empty() || !seen.insert(url.clone()) {
                continue;
            }
            candidates.push(SourceCandidate::new(url, self.name(), self.priority()));
        }
        Ok(candidates)
    }
}
