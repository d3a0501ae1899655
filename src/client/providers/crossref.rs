use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefWork,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
    #[serde(default)]
    link: Vec<CrossrefLink>,
    resource: Option<CrossrefResource>,
}

#[derive(Debug, Deserialize)]
struct CrossrefLink {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefResource {
    primary: Option<CrossrefPrimary>,
}

#[derive(Debug, Deserialize)]
struct CrossrefPrimary {
    #[serde(rename = "URL")]
    url: Option<String>,
}

/// Crossref provider - publisher-registered metadata and full-text links.
///
/// Crossref is metadata-first: its `link` entries are whatever publishers
/// registered, frequently paywalled. PDF-typed links are still worth trying
/// and the primary resource URL gives the classifier a landing page to rank
/// near the bottom.
pub struct CrossrefProvider {
    client: Client,
    base_url: String,
}

impl CrossrefProvider {
    pub fn new(http: &HttpSettings) -> Result<Self, ProviderError> {
        // Crossref's polite pool wants a mailto in the user agent.
        let client = crate::client::build_http_client(
            http,
            Some("litharvest/0.3.0 (Dataset Literature Tool; mailto:litharvest@example.org)"),
        )
        .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://api.crossref.org".to_string(),
        })
    }

    fn build_work_url(&self, doi: &str) -> String {
        format!("{}/works/{}", self.base_url, urlencoding::encode(doi))
    }

    fn candidates_from_work(&self, work: CrossrefWork) -> Vec<SourceCandidate> {
        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();

        for link in work.link {
            let is_pdf = link
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"));
            if !is_pdf && !link.url.to_lowercase().contains(".pdf") {
                continue;
            }
            if link.url.is_empty() || !seen.insert(link.url.clone()) {
                continue;
            }
            candidates.push(SourceCandidate::new(link.url, self.name(), self.priority()));
        }

        if let Some(primary) = work.resource.and_then(|r| r.primary).and_then(|p| p.url) {
            if !primary.is_empty() && seen.insert(primary.clone()) {
                candidates.push(SourceCandidate::new(primary, self.name(), self.priority()));
            }
        }
        candidates
    }
}

#[async_trait]
impl SourceProvider for CrossrefProvider {
    fn name(&self) -> &'static str {
        "crossref"
    }

    fn description(&self) -> &'static str {
        "Crossref - publisher-registered DOI metadata and links"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(700)
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

        let url = self.build_work_url(doi);
        debug!("Querying Crossref: {}", url);

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

        let body: CrossrefResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Crossref work response");
            ProviderError::Parse(format!("Failed to parse JSON: {e}"))
        })?;

        Ok(self.candidates_from_work(body.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_interface() {
        let provider = CrossrefProvider::new(&HttpSettings::default()).unwrap();
        assert_eq!(provider.name(), "crossref");
        assert_eq!(provider.priority(), 60);
    }

    #[test]
    fn test_work_url_building() {
        let provider = CrossrefProvider::new(&HttpSettings::default()).unwrap();
        let url = provider.build_work_url("10.1038/nature12373");
        assert!(url.contains("api.crossref.org/works/"));
        assert!(url.contains("10.1038%2Fnature12373"));
    }

    #[test]
    fn test_only_pdf_links_and_primary_resource_survive() {
        let provider = CrossrefProvider::new(&HttpSettings::default()).unwrap();
        let body: CrossrefResponse = serde_json::from_str(
            r#"{
                "message": {
                    "link": [
                        {"URL": "https://publisher.example/article.pdf", "content-type": "application/pdf"},
                        {"URL": "https://publisher.example/article.xml", "content-type": "application/xml"},
                        {"URL": "https://publisher.example/similarity.pdf", "content-type": "unspecified"}
                    ],
                    "resource": {
                        "primary": {"URL": "https://publisher.example/doi/10.1/abc"}
                    }
                }
            }"#,
        )
        .unwrap();

        let candidates = provider.candidates_from_work(body.message);
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert!(urls.contains(&"https://publisher.example/article.pdf"));
        assert!(urls.contains(&"https://publisher.example/similarity.pdf"));
        assert!(urls.contains(&"https://publisher.example/doi/10.1/abc"));
        assert!(!urls.iter().any(|u| u.ends_with(".xml")));
    }
}
