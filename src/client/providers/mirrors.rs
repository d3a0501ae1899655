use super::traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
use crate::config::HttpSettings;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Last-resort mirror provider.
///
/// Mirrors serve an HTML shell with the paper embedded; the PDF URL has to
/// be scraped out of `embed`/`iframe` tags. Two instances run at the bottom
/// of the waterfall, each rotating through its own configured host list, so
/// a dead mirror network degrades to zero candidates rather than an error.
pub struct MirrorProvider {
    client: Client,
    name: &'static str,
    priority: u8,
    hosts: Vec<String>,
    next_host: AtomicUsize,
}

impl MirrorProvider {
    pub fn new(
        http: &HttpSettings,
        name: &'static str,
        priority: u8,
        hosts: Vec<String>,
    ) -> Result<Self, ProviderError> {
        if hosts.is_empty() {
            return Err(ProviderError::InvalidIdentifier(
                "mirror provider needs at least one host".to_string(),
            ));
        }

        // Mirrors serve tool user agents a captcha page.
        let client = crate::client::build_http_client(
            http,
            Some(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/122.0.0.0 Safari/537.36",
            ),
        )
        .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            name,
            priority,
            hosts,
            next_host: AtomicUsize::new(0),
        })
    }

    /// Primary mirror network, tried before the secondary one.
    pub fn primary(http: &HttpSettings, hosts: Vec<String>) -> Result<Self, ProviderError> {
        Self::new(http, "mirror_primary", 90, hosts)
    }

    /// Secondary mirror network, the very last candidates in the waterfall.
    pub fn secondary(http: &HttpSettings, hosts: Vec<String>) -> Result<Self, ProviderError> {
        Self::new(http, "mirror_secondary", 95, hosts)
    }

    fn rotate_host(&self) -> &str {
        let index = self.next_host.fetch_add(1, Ordering::Relaxed);
        &self.hosts[index % self.hosts.len()]
    }

    /// Extract an embedded PDF URL from a mirror page.
    fn extract_pdf_url(host: &str, html: &str) -> Option<String> {
        if html.contains("article not found") || html.contains("no fulltext") {
            return None;
        }

        let document = Html::parse_document(html);
        let selector = Selector::parse("embed[src], iframe[src], a[href*='.pdf']").ok()?;

        for element in document.select(&selector) {
            let Some(src) = element
                .value()
                .attr("src")
                .or_else(|| element.value().attr("href"))
            else {
                continue;
            };
            if src.is_empty() || !(src.contains(".pdf") || src.starts_with("//")) {
                continue;
            }

            if src.starts_with("//") {
                return Some(format!("https:{src}"));
            }
            if src.starts_with("http") {
                return Some(src.to_string());
            }
            // Relative path, resolve against the mirror host.
            match url::Url::parse(host).and_then(|base| base.join(src)) {
                Ok(absolute) => return Some(absolute.to_string()),
                Err(e) => {
                    warn!("Failed to resolve mirror URL '{}': {}", src, e);
                    continue;
                }
            }
        }
        None
    }

    async fn try_host(&self, host: &str, doi: &str) -> Result<Option<String>, ProviderError> {
        let url = format!("{}/{}", host.trim_end_matches('/'), urlencoding::encode(doi));
        debug!("Trying mirror page: {}", url);

        let response = self
            .client
            .get(&url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Request failed: {e}")))?;

        match response.status().as_u16() {
            404 => return Ok(None),
            429 => return Err(ProviderError::RateLimit),
            403 => {
                return Err(ProviderError::Network(format!(
                    "HTTP 403 from mirror {host}: access denied, trying next mirror"
                )))
            }
            status if status >= 400 => {
                return Err(ProviderError::Network(format!("HTTP {status} from {host}")));
            }
            _ => {}
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))?;

        Ok(Self::extract_pdf_url(host, &html))
    }
}

#[async_trait]
impl SourceProvider for MirrorProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Last-resort full-text mirror network"
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn base_delay(&self) -> Duration {
        Duration::from_secs(2)
    }

    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError> {
        let Some(doi) = ids.doi.as_deref() else {
            return Ok(Vec::new());
        };

        for _ in 0..self.hosts.len() {
            context.rate_limiter.acquire(self.name()).await;
            let host = self.rotate_host().to_string();

            match self.try_host(&host, doi).await {
                Ok(Some(pdf_url)) => {
                    debug!("Mirror {} produced a PDF URL", host);
                    return Ok(vec![SourceCandidate::new(
                        pdf_url,
                        self.name(),
                        self.priority(),
                    )]);
                }
                Ok(None) => debug!("Paper not found on mirror: {}", host),
                Err(ProviderError::RateLimit) => return Err(ProviderError::RateLimit),
                Err(e) => warn!("Mirror {} failed: {}", host, e),
            }
        }
        Ok(Vec::new())
    }

    async fn health_check(&self, _context: &CollectContext) -> Result<bool, ProviderError> {
        let host = &self.hosts[0];
        match self.client.get(host).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Mirror health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation_needs_hosts() {
        assert!(MirrorProvider::primary(&HttpSettings::default(), vec![]).is_err());
        let provider =
            MirrorProvider::primary(&HttpSettings::default(), vec!["https://mirror-a.example".to_string()]).unwrap();
        assert_eq!(provider.name(), "mirror_primary");
        assert_eq!(provider.priority(), 90);
    }

    #[test]
    fn test_secondary_ranks_after_primary() {
        let primary = MirrorProvider::primary(&HttpSettings::default(), vec!["https://a.example".to_string()]).unwrap();
        let secondary = MirrorProvider::secondary(&HttpSettings::default(), vec!["https://b.example".to_string()]).unwrap();
        assert!(secondary.priority() > primary.priority());
    }

    #[test]
    fn test_host_rotation_wraps() {
        let provider = MirrorProvider::primary(&HttpSettings::default(), vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
        ])
        .unwrap();
        assert_eq!(provider.rotate_host(), "https://a.example");
        assert_eq!(provider.rotate_host(), "https://b.example");
        assert_eq!(provider.rotate_host(), "https://a.example");
    }

    #[test]
    fn test_extract_pdf_from_embed() {
        let html = r#"<html><body>
            <embed type="application/pdf" src="//dl.mirror.example/paper.pdf#view=FitH"></embed>
        </body></html>"#;
        assert_eq!(
            MirrorProvider::extract_pdf_url("https://mirror.example", html),
            Some("https://dl.mirror.example/paper.pdf#view=FitH".to_string())
        );
    }

    #[test]
    fn test_extract_pdf_resolves_relative_urls() {
        let html = r#"<iframe src="/downloads/2020/paper.pdf"></iframe>"#;
        assert_eq!(
            MirrorProvider::extract_pdf_url("https://mirror.example", html),
            Some("https://mirror.example/downloads/2020/paper.pdf".to_string())
        );
    }

    #[test]
    fn test_extract_pdf_not_found_page() {
        let html = "<html><body>article not found</body></html>";
        assert_eq!(
            MirrorProvider::extract_pdf_url("https://mirror.example", html),
            None
        );
    }
}
