use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Cold Spring Harbor preprint API response
#[derive(Debug, Deserialize)]
struct PreprintDetails {
    #[serde(default)]
    collection: Vec<PreprintVersion>,
}

#[derive(Debug, Deserialize)]
struct PreprintVersion {
    version: Option<String>,
}

/// Which preprint server a provider instance talks to.
///
/// bioRxiv and medRxiv share one API and one URL scheme; the server is pure
/// data, so both providers are instances of this type rather than two
/// near-identical modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprintServer {
    Biorxiv,
    Medrxiv,
}

impl PreprintServer {
    fn api_segment(self) -> &'static str {
        match self {
            PreprintServer::Biorxiv => "biorxiv",
            PreprintServer::Medrxiv => "medrxiv",
        }
    }

    fn content_host(self) -> &'static str {
        match self {
            PreprintServer::Biorxiv => "www.biorxiv.org",
            PreprintServer::Medrxiv => "www.medrxiv.org",
        }
    }
}

/// Preprint server provider (bioRxiv / medRxiv).
pub struct PreprintProvider {
    client: Client,
    api_base: String,
    server: PreprintServer,
}

impl PreprintProvider {
    pub fn new(http: &HttpSettings, server: PreprintServer) -> Result<Self, ProviderError> {
        let client = crate::client::build_http_client(http, None)
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: "https://api.biorxiv.org".to_string(),
            server,
        })
    }

    pub fn biorxiv(http: &HttpSettings) -> Result<Self, ProviderError> {
        Self::new(http, PreprintServer::Biorxiv)
    }

    pub fn medrxiv(http: &HttpSettings) -> Result<Self, ProviderError> {
        Self::new(http, PreprintServer::Medrxiv)
    }

    fn build_details_url(&self, doi: &str) -> String {
        format!(
            "{}/details/{}/{}",
            self.api_base,
            self.server.api_segment(),
            doi
        )
    }

    fn pdf_url(&self, doi: &str, version: &str) -> String {
        format!(
            "https://{}/content/{}v{}.full.pdf",
            self.server.content_host(),
            doi,
            version
        )
    }
}

#[async_trait]
impl SourceProvider for PreprintProvider {
    fn name(&self) -> &'static str {
        match self.server {
            PreprintServer::Biorxiv => "biorxiv",
            PreprintServer::Medrxiv => "medrxiv",
        }
    }

    fn description(&self) -> &'static str {
        match self.server {
            PreprintServer::Biorxiv => "bioRxiv - biology preprint server",
            PreprintServer::Medrxiv => "medRxiv - health sciences preprint server",
        }
    }

    fn priority(&self) -> u8 {
        35
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(500)
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        // Cold Spring Harbor preprints all live under the 10.1101 prefix;
        // anything else cannot be here.
        let doi = match ids.doi.as_deref() {
            Some(doi) if doi.starts_with("10.1101/") => doi,
            _ => return Ok(Vec::new()),
        };

        context.rate_limiter.acquire(self.name()).await;

        let url = self.build_details_url(doi);
        debug!("Querying {} details: {}", self.name(), url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimit);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "API request failed with status: {}",
                response.status()
            )));
        }

        let details: PreprintDetails = response.json().await.map_err(|e| {
            warn!("Failed to parse {} details response", self.name());
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        // Latest version last in the collection; default to v1 when the
        // API returns a record without a version field.
        let Some(latest) = details.collection.last() else {
            return Ok(Vec::new());
        };
        let version = latest.version.as_deref().unwrap_or("1");

        Ok(vec![SourceCandidate::new(
            self.pdf_url(doi, version),
            self.name(),
            self.priority(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, UrlKind};

    #[test]
    fn test_provider_names_are_data_driven() {
        let bio = PreprintProvider::biorxiv(&HttpSettings::default()).unwrap();
        let med = PreprintProvider::medrxiv(&HttpSettings::default()).unwrap();
        assert_eq!(bio.name(), "biorxiv");
        assert_eq!(med.name(), "medrxiv");
        assert_eq!(bio.priority(), med.priority());
    }

    #[test]
    fn test_details_url_building() {
        let provider = PreprintProvider::medrxiv(&HttpSettings::default()).unwrap();
        let url = provider.build_details_url("10.1101/2020.03.24.20042937");
        assert_eq!(
            url,
            "https://api.biorxiv.org/details/medrxiv/10.1101/2020.03.24.20042937"
        );
    }

    #[test]
    fn test_pdf_url_is_versioned_and_direct() {
        let provider = PreprintProvider::biorxiv(&HttpSettings::default()).unwrap();
        let url = provider.pdf_url("10.1101/2020.01.01.123456", "2");
        assert_eq!(
            url,
            "https://www.biorxiv.org/content/10.1101/2020.01.01.123456v2.full.pdf"
        );
        assert_eq!(classify(&url).0, UrlKind::DirectPdf);
    }

    #[test]
    fn test_version_parse_takes_latest() {
        let details: PreprintDetails = serde_json::from_str(
            r#"{"collection": [{"version": "1"}, {"version": "2"}, {"version": "3"}]}"#,
        )
        .unwrap();
        assert_eq!(
            details.collection.last().and_then(|v| v.version.as_deref()),
            Some("3")
        );
    }
}
